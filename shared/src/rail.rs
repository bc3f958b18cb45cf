use serde::{Deserialize, Serialize};
use std::fmt;

/// Out-of-band payment rail an order settles through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rail {
    Ach,
    Card,
}

impl fmt::Display for Rail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rail::Ach => f.write_str("ach"),
            Rail::Card => f.write_str("card"),
        }
    }
}

/// Payment-method tags the commerce platform attaches to orders for each rail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailTags {
    pub ach: Vec<String>,
    pub card: Vec<String>,
}

impl Default for RailTags {
    fn default() -> Self {
        Self {
            ach: vec!["Green Money".to_string()],
            card: vec!["Credit/Debit Card".to_string()],
        }
    }
}

impl RailTags {
    /// Resolves the rail for an order's payment-method tags. ACH wins when an
    /// order carries tags for both rails; unknown tags resolve to `None`.
    pub fn classify<S: AsRef<str>>(&self, payment_gateway_names: &[S]) -> Option<Rail> {
        let has_tag = |tags: &[String]| {
            payment_gateway_names
                .iter()
                .any(|name| tags.iter().any(|tag| tag == name.as_ref().trim()))
        };

        if has_tag(&self.ach) {
            Some(Rail::Ach)
        } else if has_tag(&self.card) {
            Some(Rail::Card)
        } else {
            None
        }
    }
}
