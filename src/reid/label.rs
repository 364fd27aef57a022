//! Human-readable person labels: `Visitor-A` .. `Visitor-Z`, then
//! `Visitor-1`, `Visitor-2`, ...

const PREFIX: &str = "Visitor-";
const LETTERS: u64 = 26;

/// Label of the `index`-th person ever created (zero based).
pub fn label_for_index(index: u64) -> String {
    if index < LETTERS {
        format!("{PREFIX}{}", (b'A' + index as u8) as char)
    } else {
        format!("{PREFIX}{}", index - LETTERS + 1)
    }
}

/// Inverse of [`label_for_index`]; `None` for labels not produced by it.
pub fn label_index(label: &str) -> Option<u64> {
    let suffix = label.strip_prefix(PREFIX)?;
    let mut chars = suffix.chars();
    match (chars.next(), chars.next()) {
        (Some(c @ 'A'..='Z'), None) => Some(c as u64 - 'A' as u64),
        _ => match suffix.parse::<u64>() {
            Ok(n) if n >= 1 && !suffix.starts_with('0') && !suffix.starts_with('+') => {
                Some(n + LETTERS - 1)
            }
            _ => None,
        },
    }
}

/// Monotonic label source. Labels are never reused, even after merges.
#[derive(Debug, Default)]
pub(crate) struct LabelAllocator {
    next: u64,
}

impl LabelAllocator {
    pub fn allocate(&mut self) -> String {
        let label = label_for_index(self.next);
        self.next += 1;
        label
    }

    /// Make sure labels restored from storage are never handed out again.
    pub fn observe(&mut self, label: &str) {
        if let Some(index) = label_index(label) {
            self.next = self.next.max(index + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_then_numbers() {
        let mut labels = LabelAllocator::default();
        let all: Vec<String> = (0..28).map(|_| labels.allocate()).collect();
        assert_eq!(all[0], "Visitor-A");
        assert_eq!(all[1], "Visitor-B");
        assert_eq!(all[25], "Visitor-Z");
        assert_eq!(all[26], "Visitor-1");
        assert_eq!(all[27], "Visitor-2");
    }

    #[test]
    fn test_label_index_roundtrip_edges() {
        assert_eq!(label_index("Visitor-A"), Some(0));
        assert_eq!(label_index("Visitor-Z"), Some(25));
        assert_eq!(label_index("Visitor-1"), Some(26));
        assert_eq!(label_index("Visitor-0"), None);
        assert_eq!(label_index("Visitor-a"), None);
        assert_eq!(label_index("Guest-A"), None);
    }

    #[test]
    fn test_observe_skips_restored_labels() {
        let mut labels = LabelAllocator::default();
        labels.observe("Visitor-C");
        labels.observe("Visitor-A");
        assert_eq!(labels.allocate(), "Visitor-D");
    }
}
