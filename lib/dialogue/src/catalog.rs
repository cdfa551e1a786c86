//! The goals the assistant can complete.
//!
//! A goal is adopted when the user's intent names it. Each goal declares the
//! slots it needs filled before its action can run.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use viki_core::Entity;

/// A named parameter a goal needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpec {
    /// Slot name, also the action parameter name.
    pub name: String,
    /// Prompt key for asking the user; defaults to `ask_<name>`.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Entity types that fill this slot besides an entity named like it.
    #[serde(default)]
    pub entity_types: Vec<String>,
    /// Long-term memory key that may already know the value.
    #[serde(default)]
    pub knowledge_key: Option<String>,
}

impl SlotSpec {
    /// Creates a slot with no extra entity types or knowledge key.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: None,
            entity_types: Vec::new(),
            knowledge_key: None,
        }
    }

    /// Adds an entity type that fills this slot.
    #[must_use]
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_types.push(entity_type.into());
        self
    }

    /// Sets the long-term memory key for this slot.
    #[must_use]
    pub fn with_knowledge_key(mut self, key: impl Into<String>) -> Self {
        self.knowledge_key = Some(key.into());
        self
    }

    /// Returns the prompt key used to ask for this slot.
    #[must_use]
    pub fn prompt(&self) -> Cow<'_, str> {
        match &self.prompt {
            Some(p) => Cow::Borrowed(p),
            None => Cow::Owned(format!("ask_{}", self.name)),
        }
    }

    /// Returns true if `entity` fills this slot.
    #[must_use]
    pub fn accepts(&self, entity: &Entity) -> bool {
        entity.name == self.name || self.entity_types.iter().any(|t| *t == entity.entity_type)
    }
}

/// A task the assistant can complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalSpec {
    /// Goal name; equal to the intent that adopts it.
    pub name: String,
    /// Action to execute once slots are filled; defaults to the goal name.
    #[serde(default)]
    pub action_name: Option<String>,
    /// Slots in the order they are asked for.
    #[serde(default)]
    pub required_slots: Vec<SlotSpec>,
    /// Whether the user must confirm before the action runs.
    #[serde(default)]
    pub requires_confirmation: bool,
}

impl GoalSpec {
    /// Creates a goal with no slots.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action_name: None,
            required_slots: Vec::new(),
            requires_confirmation: false,
        }
    }

    /// Adds a required slot.
    #[must_use]
    pub fn with_slot(mut self, slot: SlotSpec) -> Self {
        self.required_slots.push(slot);
        self
    }

    /// Requires confirmation before the action runs.
    #[must_use]
    pub fn confirmed(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    /// Returns the action this goal executes.
    #[must_use]
    pub fn action_name(&self) -> &str {
        self.action_name.as_deref().unwrap_or(&self.name)
    }

    /// Returns true if the goal declares `slot`.
    #[must_use]
    pub fn declares(&self, slot: &str) -> bool {
        self.required_slots.iter().any(|s| s.name == slot)
    }

    /// Returns the required slots not yet in `filled`, in asking order.
    pub fn missing_slots<'s, 'f>(
        &'s self,
        filled: &'f BTreeMap<String, String>,
    ) -> impl Iterator<Item = &'s SlotSpec> + use<'s, 'f> {
        self.required_slots
            .iter()
            .filter(move |s| !filled.contains_key(&s.name))
    }

    /// Finds the slot an entity fills.
    ///
    /// A slot named like the entity wins over a slot matching its type.
    #[must_use]
    pub fn slot_for_entity(&self, entity: &Entity) -> Option<&SlotSpec> {
        self.required_slots
            .iter()
            .find(|s| s.name == entity.name)
            .or_else(|| self.required_slots.iter().find(|s| s.accepts(entity)))
    }
}

/// Goals keyed by the intent that adopts them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<GoalSpec>", into = "Vec<GoalSpec>")]
pub struct GoalCatalog {
    goals: HashMap<String, GoalSpec>,
}

impl GoalCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            goals: HashMap::new(),
        }
    }

    /// Adds or replaces a goal.
    pub fn insert(&mut self, goal: GoalSpec) {
        self.goals.insert(goal.name.clone(), goal);
    }

    /// Looks up the goal adopted by `intent`.
    #[must_use]
    pub fn get(&self, intent: &str) -> Option<&GoalSpec> {
        self.goals.get(intent)
    }

    /// Returns true if `intent` names a goal.
    #[must_use]
    pub fn contains(&self, intent: &str) -> bool {
        self.goals.contains_key(intent)
    }

    /// Returns the number of goals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.goals.len()
    }

    /// Returns true if the catalog has no goals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }
}

impl Default for GoalCatalog {
    fn default() -> Self {
        Self::from(vec![
            GoalSpec::new("book_flight")
                .with_slot(SlotSpec::new("destination").with_entity_type("city"))
                .with_slot(SlotSpec::new("departure_date").with_entity_type("date"))
                .confirmed(),
            GoalSpec::new("check_weather").with_slot(
                SlotSpec::new("location")
                    .with_entity_type("city")
                    .with_knowledge_key("home_city"),
            ),
            GoalSpec::new("get_time").with_slot(SlotSpec::new("location").with_entity_type("city")),
            GoalSpec::new("set_reminder")
                .with_slot(SlotSpec::new("reminder_text"))
                .with_slot(SlotSpec::new("reminder_time").with_entity_type("time")),
            GoalSpec::new("tell_joke"),
        ])
    }
}

impl From<Vec<GoalSpec>> for GoalCatalog {
    fn from(goals: Vec<GoalSpec>) -> Self {
        let mut catalog = Self::empty();
        for goal in goals {
            catalog.insert(goal);
        }
        catalog
    }
}

impl From<GoalCatalog> for Vec<GoalSpec> {
    fn from(catalog: GoalCatalog) -> Self {
        let mut goals: Vec<GoalSpec> = catalog.goals.into_values().collect();
        goals.sort_by(|a, b| a.name.cmp(&b.name));
        goals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_builtin_goals() {
        let catalog = GoalCatalog::default();
        assert_eq!(catalog.len(), 5);

        let flight = catalog.get("book_flight").unwrap();
        assert!(flight.requires_confirmation);
        assert_eq!(flight.action_name(), "book_flight");
        assert!(flight.declares("departure_date"));

        let weather = catalog.get("check_weather").unwrap();
        assert_eq!(
            weather.required_slots[0].knowledge_key.as_deref(),
            Some("home_city")
        );
        assert!(catalog.get("tell_joke").unwrap().required_slots.is_empty());
        assert!(!catalog.contains("unknown"));
    }

    #[test]
    fn missing_slots_follow_declaration_order() {
        let catalog = GoalCatalog::default();
        let flight = catalog.get("book_flight").unwrap();
        let mut filled = BTreeMap::new();

        let missing: Vec<_> = flight.missing_slots(&filled).map(|s| s.name.as_str()).collect();
        assert_eq!(missing, vec!["destination", "departure_date"]);

        filled.insert("destination".to_string(), "London".to_string());
        let missing: Vec<_> = flight.missing_slots(&filled).map(|s| s.name.as_str()).collect();
        assert_eq!(missing, vec!["departure_date"]);
    }

    #[test]
    fn entity_name_match_wins_over_type() {
        let goal = GoalSpec::new("trip")
            .with_slot(SlotSpec::new("origin").with_entity_type("city"))
            .with_slot(SlotSpec::new("destination").with_entity_type("city"));

        let named = Entity::new("destination", "Paris").with_type("city");
        assert_eq!(goal.slot_for_entity(&named).unwrap().name, "destination");

        let typed = Entity::new("place", "Paris").with_type("city");
        assert_eq!(goal.slot_for_entity(&typed).unwrap().name, "origin");

        let other = Entity::new("color", "red");
        assert!(goal.slot_for_entity(&other).is_none());
    }

    #[test]
    fn prompt_defaults_to_ask_slot() {
        let slot = SlotSpec::new("departure_date");
        assert_eq!(slot.prompt(), "ask_departure_date");

        let custom = SlotSpec {
            prompt: Some("when_leaving".to_string()),
            ..slot
        };
        assert_eq!(custom.prompt(), "when_leaving");
    }

    #[test]
    fn catalog_deserializes_from_list() {
        let json = r#"[
            {"name": "order_pizza", "required_slots": [{"name": "size"}], "requires_confirmation": true},
            {"name": "ping", "action_name": "ping_host"}
        ]"#;
        let catalog: GoalCatalog = serde_json::from_str(json).unwrap();

        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("order_pizza").unwrap().requires_confirmation);
        assert_eq!(catalog.get("ping").unwrap().action_name(), "ping_host");
    }
}
