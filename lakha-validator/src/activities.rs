//! The fixed catalog of contribution activities validators can report
//! against to earn credits.

#[derive(Debug, Clone, Copy)]
pub struct ActivityDefinition {
    pub key: &'static str,
    pub description: &'static str,
    pub credit_rate: f64,
    pub max_credits: f64,
}

pub const CONTRIBUTION_ACTIVITIES: &[ActivityDefinition] = &[
    ActivityDefinition {
        key: "code_audit",
        description: "Reviewed node or contract code for correctness and security",
        credit_rate: 5.0,
        max_credits: 50.0,
    },
    ActivityDefinition {
        key: "documentation",
        description: "Authored or improved network documentation",
        credit_rate: 2.0,
        max_credits: 20.0,
    },
    ActivityDefinition {
        key: "community_support",
        description: "Helped other participants in community channels",
        credit_rate: 1.0,
        max_credits: 15.0,
    },
    ActivityDefinition {
        key: "bug_report",
        description: "Reported a reproducible defect in the network or its tooling",
        credit_rate: 3.0,
        max_credits: 30.0,
    },
    ActivityDefinition {
        key: "educational_content",
        description: "Produced tutorials or educational material about the network",
        credit_rate: 4.0,
        max_credits: 40.0,
    },
];

pub fn lookup(key: &str) -> Option<&'static ActivityDefinition> {
    CONTRIBUTION_ACTIVITIES.iter().find(|a| a.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_known_activity() {
        let def = lookup("code_audit").unwrap();
        assert_eq!(def.credit_rate, 5.0);
    }

    #[test]
    fn lookup_rejects_unknown_activity() {
        assert!(lookup("nonsense").is_none());
    }
}
