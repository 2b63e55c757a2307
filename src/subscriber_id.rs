use std::fmt;
use uuid::Uuid;

/// Identity of one subscriber connection on one topic.
///
/// The same id is reported in the connect and the disconnect event of a
/// subscriber, so callbacks can pair them up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", &self.0.simple().to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_generate_unique() {
        // ---
        let id1 = SubscriberId::generate();
        let id2 = SubscriberId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_display_is_short_tag() {
        // ---
        let shown = SubscriberId::generate().to_string();
        assert!(shown.starts_with("sub-"));
        assert_eq!(shown.len(), 12);
    }
}
