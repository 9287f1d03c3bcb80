use crate::spoolman::{self, Spool};
use serde::{Deserialize, Serialize};

/// Parameters for listing spools.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::Parser))]
pub struct SpoolListParams {
    /// Include archived spools and keep the server's order.
    #[cfg_attr(feature = "cli", clap(long))]
    #[serde(default)]
    pub all: bool,

    /// Only keep spools whose filament name, vendor or material contains
    /// this text (case-insensitive).
    #[cfg_attr(feature = "cli", clap(long, short))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl SpoolListParams {
    pub fn apply(&self, spools: Vec<Spool>) -> Vec<Spool> {
        let spools = if self.all {
            spools
        } else {
            spoolman::active_by_recency(spools)
        };

        match self.search.as_deref() {
            Some(query) => spools.into_iter().filter(|s| s.matches(query)).collect(),
            None => spools,
        }
    }
}
