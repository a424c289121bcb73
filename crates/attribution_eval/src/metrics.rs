//! Accuracy, confusion matrix and per-class report.

use std::fmt;

/// Fraction of positions where `y_pred` matches `y_true`; 0 when empty.
pub fn accuracy_score(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let n = y_true.len().min(y_pred.len());
    if n == 0 {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(a, b)| a == b).count();
    correct as f64 / n as f64
}

/// `matrix[true][pred]` counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_pred: &[usize], y_true: &[usize]) -> Self {
        let n_classes = y_pred
            .iter()
            .chain(y_true)
            .max()
            .map_or(0, |&m| m + 1);
        let mut matrix = vec![vec![0; n_classes]; n_classes];
        for (&pred, &truth) in y_pred.iter().zip(y_true) {
            matrix[truth][pred] += 1;
        }
        Self { matrix }
    }

    pub fn n_classes(&self) -> usize {
        self.matrix.len()
    }

    pub fn get(&self, truth: usize, pred: usize) -> usize {
        self.matrix[truth][pred]
    }

    pub fn support(&self, class: usize) -> usize {
        self.matrix[class].iter().sum()
    }

    pub fn predicted(&self, class: usize) -> usize {
        self.matrix.iter().map(|row| row[class]).sum()
    }

    pub fn precision(&self, class: usize) -> f64 {
        ratio(self.get(class, class), self.predicted(class))
    }

    pub fn recall(&self, class: usize) -> f64 {
        ratio(self.get(class, class), self.support(class))
    }

    pub fn f1(&self, class: usize) -> f64 {
        let (p, r) = (self.precision(class), self.recall(class));
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for j in 0..self.n_classes() {
            write!(f, " {:>6}", format!("p{j}"))?;
        }
        writeln!(f)?;
        for (i, row) in self.matrix.iter().enumerate() {
            write!(f, "{:>8}", format!("t{i}"))?;
            for count in row {
                write!(f, " {count:>6}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Per-class precision, recall, f1 and support, plus overall accuracy.
pub fn classification_report(
    y_pred: &[usize],
    y_true: &[usize],
    class_names: &[String],
) -> String {
    let cm = ConfusionMatrix::from_predictions(y_pred, y_true);
    let mut out = format!(
        "{:>14} {:>10} {:>10} {:>10} {:>8}\n",
        "", "precision", "recall", "f1-score", "support"
    );
    for class in 0..cm.n_classes() {
        let name = class_names
            .get(class)
            .cloned()
            .unwrap_or_else(|| class.to_string());
        out.push_str(&format!(
            "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>8}\n",
            name,
            cm.precision(class),
            cm.recall(class),
            cm.f1(class),
            cm.support(class)
        ));
    }
    out.push_str(&format!(
        "{:>14} {:>10} {:>10} {:>10.2} {:>8}\n",
        "accuracy",
        "",
        "",
        accuracy_score(y_true, y_pred),
        y_true.len()
    ));
    out
}
