//! Scenario files: who lives in the town, what they plan to do, and which
//! firms they can buy from.
//!
//! A scenario is a YAML document loaded next to `worldsim-config.yaml`. It
//! seeds the world once, before the first tick; from then on the world only
//! changes through logged events.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use worldsim_types::{AgentId, PlaceId, PlanStep};
use worldsim_world::{FirmLedger, WorldError, WorldState};

use crate::error::EngineError;

/// A town to simulate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scenario {
    /// Day to simulate. Defaults to the date of the configured start time.
    #[serde(default)]
    pub date: Option<NaiveDate>,

    /// Location path prefix of every event, most general first.
    #[serde(default)]
    pub location: Vec<String>,

    /// Known places. Empty means any place is accepted.
    #[serde(default)]
    pub places: Vec<String>,

    /// The population.
    #[serde(default)]
    pub agents: Vec<ScenarioAgent>,

    /// Firms with their opening ledgers.
    #[serde(default)]
    pub firms: Vec<ScenarioFirm>,
}

/// One simulated person.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenarioAgent {
    /// Stable identifier.
    pub id: String,

    /// Display name as it appears in event content. Defaults to the id.
    #[serde(default)]
    pub name: Option<String>,

    /// Age in years, used to pick a wake time.
    #[serde(default = "default_age")]
    pub age: u32,

    /// Where the agent starts the day.
    pub home: String,

    /// The agent's plan for the day.
    #[serde(default)]
    pub plan: Vec<PlanStep>,
}

impl ScenarioAgent {
    /// The name used in event content.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// A firm and its opening ledger.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScenarioFirm {
    /// Stable identifier.
    pub id: String,

    /// Opening cash.
    #[serde(default)]
    pub cash: Decimal,

    /// Opening accounts payable.
    #[serde(default)]
    pub ap: Decimal,

    /// Products on the shelf.
    #[serde(default)]
    pub products: Vec<ScenarioProduct>,
}

/// A stocked product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScenarioProduct {
    /// Stock keeping unit.
    pub sku: String,
    /// Units on hand.
    #[serde(default)]
    pub qty: u64,
    /// Unit sale price.
    pub price: Decimal,
    /// Unit cost.
    #[serde(default)]
    pub cost: Decimal,
}

const fn default_age() -> u32 {
    35
}

impl Scenario {
    /// Load a scenario from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Scenario`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path).map_err(|e| EngineError::Scenario {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::parse(&contents)
    }

    /// Parse a scenario from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Scenario`] if the YAML does not describe a
    /// scenario.
    pub fn parse(yaml: &str) -> Result<Self, EngineError> {
        serde_yml::from_str(yaml).map_err(|e| EngineError::Scenario {
            message: format!("failed to parse scenario: {e}"),
        })
    }

    /// Build the opening world: every agent at home, every firm with its
    /// ledger, every listed place (homes included).
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] on duplicate agent or firm ids.
    pub fn build_world(&self) -> Result<WorldState, WorldError> {
        let mut builder = WorldState::builder();
        if !self.places.is_empty() {
            for place in &self.places {
                builder = builder.place(place.as_str());
            }
            for agent in &self.agents {
                builder = builder.place(agent.home.as_str());
            }
        }
        for agent in &self.agents {
            builder = builder.agent(AgentId::new(agent.id.as_str()), PlaceId::new(agent.home.as_str()));
        }
        for firm in &self.firms {
            let mut ledger = FirmLedger::new(firm.id.as_str().into())
                .with_cash(firm.cash)
                .with_ap(firm.ap);
            for product in &firm.products {
                ledger = ledger.with_product(&product.sku, product.qty, product.price, product.cost);
            }
            builder = builder.firm(ledger);
        }
        builder.build()
    }

    /// Display name of every agent, keyed by id.
    pub fn display_names(&self) -> BTreeMap<AgentId, String> {
        self.agents
            .iter()
            .map(|a| (AgentId::new(a.id.as_str()), a.display_name().to_owned()))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;
    use worldsim_types::FirmId;

    use super::*;

    const TOWN: &str = r#"
date: 2024-06-03
location: [USA, Maine, Portland]
places: [park, grocer]
agents:
  - id: ada
    name: Ada Park
    age: 34
    home: ada_home
    plan:
      - target_time: "07:30 AM"
        action: MorningRoutine
        location: ada_home
      - target_time: "10:00 AM"
        action: Travel
        location: ada_home
        parameters:
          to: park
  - id: bo
    home: bo_home
firms:
  - id: grocer
    cash: "100.00"
    products:
      - sku: MILK_GAL
        qty: 9
        price: "4.50"
        cost: "2.10"
"#;

    #[test]
    fn parses_agents_plans_and_firms() {
        let scenario = Scenario::parse(TOWN).unwrap();
        assert_eq!(scenario.date, NaiveDate::from_ymd_opt(2024, 6, 3));
        assert_eq!(scenario.agents.len(), 2);
        let ada = scenario.agents.first().unwrap();
        assert_eq!(ada.display_name(), "Ada Park");
        assert_eq!(ada.plan.len(), 2);
        let bo = scenario.agents.get(1).unwrap();
        assert_eq!(bo.display_name(), "bo");
        assert_eq!(bo.age, 35);
        assert!(bo.plan.is_empty());
    }

    #[test]
    fn world_holds_agents_at_home_and_firm_ledgers() {
        let world = Scenario::parse(TOWN).unwrap().build_world().unwrap();
        assert_eq!(
            world.agent_position(&AgentId::new("ada")),
            Some(&PlaceId::new("ada_home"))
        );
        assert!(world.place_exists(&PlaceId::new("bo_home")));
        assert!(!world.place_exists(&PlaceId::new("moon")));
        let grocer = FirmId::new("grocer");
        assert_eq!(world.firm_cash(&grocer), dec!(100.00));
        assert_eq!(world.firm_inventory(&grocer, "MILK_GAL"), 9);
    }

    #[test]
    fn duplicate_agent_is_rejected() {
        let yaml = "agents:\n  - {id: ada, home: a}\n  - {id: ada, home: b}\n";
        let scenario = Scenario::parse(yaml).unwrap();
        assert_eq!(
            scenario.build_world(),
            Err(WorldError::DuplicateAgent(AgentId::new("ada")))
        );
    }

    #[test]
    fn malformed_yaml_is_a_scenario_error() {
        assert!(matches!(
            Scenario::parse("agents: 7"),
            Err(EngineError::Scenario { .. })
        ));
    }
}
