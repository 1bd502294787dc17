//! Owner and polarity of a research object hit

use signal_core::{IndustryPlayerRecord, ResearchObject, ThesisSide};

use crate::polarity::PolarityTable;

/// Entity a research object belongs to
#[derive(Debug, Clone, PartialEq)]
pub enum Owner {
    Company(i64),
    /// Industry-level object; a player carries its record so a bound
    /// company can receive the hit directly.
    Industry {
        industry_id: i64,
        player: Option<IndustryPlayerRecord>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub owner: Owner,
    pub polarity: f64,
}

/// Fixed polarity of a company risk
pub const RISK_POLARITY: f64 = -1.0;
/// Magnitude of a catalyst, signed by its `positive` flag
pub const CATALYST_MAGNITUDE: f64 = 1.0;

/// Resolve owner and effective polarity for one research object
pub fn resolve_owner(object: &ResearchObject, table: &PolarityTable) -> Resolution {
    let base = table.polarity(object.object_type());
    match object {
        ResearchObject::CompanyProfile { company_id } => Resolution {
            owner: Owner::Company(*company_id),
            polarity: base,
        },
        ResearchObject::CompanyRisk { company_id } => Resolution {
            owner: Owner::Company(*company_id),
            polarity: RISK_POLARITY,
        },
        ResearchObject::CompanyCatalyst {
            company_id,
            positive,
        } => Resolution {
            owner: Owner::Company(*company_id),
            polarity: if *positive {
                CATALYST_MAGNITUDE
            } else {
                -CATALYST_MAGNITUDE
            },
        },
        ResearchObject::CompanyThesis { company_id, side } => Resolution {
            owner: Owner::Company(*company_id),
            polarity: match side {
                ThesisSide::For => table.thesis_magnitude,
                ThesisSide::Against => -table.thesis_magnitude,
            },
        },
        ResearchObject::IndustryProfile { industry_id } => Resolution {
            owner: Owner::Industry {
                industry_id: *industry_id,
                player: None,
            },
            polarity: base,
        },
        ResearchObject::IndustryPlayer(player) => Resolution {
            owner: Owner::Industry {
                industry_id: player.industry_id,
                player: Some(player.clone()),
            },
            polarity: base,
        },
    }
}
