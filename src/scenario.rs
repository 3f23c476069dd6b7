//! 场景与角色模板
//!
//! 每个模板给出场景描述（ScenarioDescriptor）与对话角色（PersonaProfile），二者 id 组成 ConversationKey。
//! 内置若干模板；也可从 TOML 文件加载（`[[templates]]` 数组）。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::ConversationKey;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub learning_objectives: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supporting_facts: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaProfile {
    pub id: String,
    pub name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tactics: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub boundaries: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioTemplate {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub scenario: ScenarioDescriptor,
    pub persona: PersonaProfile,
}

impl ScenarioTemplate {
    pub fn key(&self) -> ConversationKey {
        ConversationKey::new(&self.scenario.id, &self.persona.id)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    templates: Vec<ScenarioTemplate>,
}

#[derive(Clone, Debug)]
pub struct ScenarioCatalog {
    templates: Vec<ScenarioTemplate>,
}

impl ScenarioCatalog {
    pub fn new(templates: Vec<ScenarioTemplate>) -> Self {
        Self { templates }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_templates())
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let file: CatalogFile = toml::from_str(s)?;
        if file.templates.is_empty() {
            anyhow::bail!("Scenario catalog has no templates");
        }
        Ok(Self::new(file.templates))
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&data)
    }

    pub fn templates(&self) -> &[ScenarioTemplate] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&ScenarioTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.templates.iter().position(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn lines(s: &str) -> Vec<String> {
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

fn builtin_templates() -> Vec<ScenarioTemplate> {
    vec![
        ScenarioTemplate {
            id: "outside-bar-girl".into(),
            label: "Party Pressure (Maya)".into(),
            description: "Resist peer pressure and practise assertive refusal skills when a friend encourages risky behaviour at a party".into(),
            scenario: ScenarioDescriptor {
                id: "outside-bar-girl".into(),
                title: Some("Party Pressure (Maya)".into()),
                setting: Some("Outside a bar in the morning; friends are planning to go to a party later on with other seniors".into()),
                learning_objectives: lines(
                    "Recognise peer pressure and manipulative flattery\n\
                     Practise assertive refusal and boundary-setting\n\
                     Prioritise consent and preparation in social settings",
                ),
                supporting_facts: lines(
                    "The player confidently declines impulsive or unsafe behaviour\n\
                     The player recognises emotional manipulation as pressure\n\
                     The player makes a safe, self-directed decision",
                ),
            },
            persona: PersonaProfile {
                id: "friend-girl-01".into(),
                name: "Maya".into(),
                role: "Persuasive friend".into(),
                persona: Some("A popular classmate who is extroverted, charismatic and spontaneous; equates taking risks with confidence and belonging".into()),
                goals: lines(
                    "Convince the player to act impulsively at the party\n\
                     Reinforce that everyone is doing it",
                ),
                tactics: lines(
                    "Flattery and emotional appeal\n\
                     FOMO pressure\n\
                     Use simple, relatable language and avoid overly long sentences",
                ),
                boundaries: lines(
                    "No explicit sexual descriptions\n\
                     No illegal or non-consensual content\n\
                     Respect firm refusals after multiple attempts",
                ),
            },
        },
        ScenarioTemplate {
            id: "outside-bar-boy".into(),
            label: "Party Pressure (Jordan)".into(),
            description: "Stay confident in your own boundaries when a friend challenges your decisions".into(),
            scenario: ScenarioDescriptor {
                id: "outside-bar-boy".into(),
                title: Some("Party Pressure (Jordan)".into()),
                setting: Some("Outside a bar in the morning; friends are planning to go to a party later on".into()),
                learning_objectives: lines(
                    "Identify peer pressure disguised as encouragement\n\
                     Practise confident, respectful refusal",
                ),
                supporting_facts: lines(
                    "The player asserts boundaries confidently\n\
                     The player demonstrates independent decision-making",
                ),
            },
            persona: PersonaProfile {
                id: "friend-boy-01".into(),
                name: "Jordan".into(),
                role: "Persuasive friend".into(),
                persona: Some("An outgoing, confident classmate who believes being bold defines maturity".into()),
                goals: lines("Convince the player that taking risks builds confidence"),
                tactics: lines(
                    "Ego-stroking\n\
                     Peer comparison\n\
                     Use simple, relatable language and avoid overly long sentences",
                ),
                boundaries: lines(
                    "No explicit or coercive language\n\
                     Respects clear player refusal after repeated persuasion",
                ),
            },
        },
        ScenarioTemplate {
            id: "university-misinformation-both".into(),
            label: "University Misinformation (Amir)".into(),
            description: "Practise correcting common myths and encouraging shared responsibility in a calm, respectful way".into(),
            scenario: ScenarioDescriptor {
                id: "university-misinformation-both".into(),
                title: Some("Mixed Messages".into()),
                setting: Some("Outside university".into()),
                learning_objectives: lines(
                    "Identify common myths\n\
                     Practise respectful correction and assertive communication",
                ),
                supporting_facts: lines("The player corrects misinformation confidently"),
            },
            persona: PersonaProfile {
                id: "classmate-both-01".into(),
                name: "Amir".into(),
                role: "Misguided Classmate".into(),
                persona: Some("Friendly, confident, slightly over-assured; well-meaning but misinformed".into()),
                goals: lines("Reinforce common myths until corrected"),
                tactics: lines(
                    "Personal anecdotes\n\
                     Overconfidence to discourage questioning",
                ),
                boundaries: lines("De-escalates once corrected"),
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_keys_are_unique() {
        let catalog = ScenarioCatalog::builtin();
        let mut keys: Vec<_> = catalog.templates().iter().map(|t| t.key()).collect();
        keys.dedup();
        assert_eq!(keys.len(), catalog.len());
        let maya = catalog.get("outside-bar-girl").unwrap();
        assert_eq!(maya.key(), ConversationKey::new("outside-bar-girl", "friend-girl-01"));
        assert_eq!(maya.scenario.learning_objectives.len(), 3);
    }

    #[test]
    fn test_load_from_toml() {
        let toml = r#"
[[templates]]
id = "clinic"
label = "The Check-up"

[templates.scenario]
id = "clinic"
setting = "Community health clinic"
learningObjectives = ["Normalise testing"]

[templates.persona]
id = "doctor-01"
name = "Dr. Wong"
role = "Clinic doctor"
"#;
        let catalog = ScenarioCatalog::from_toml_str(toml).unwrap();
        let template = catalog.get("clinic").unwrap();
        assert_eq!(template.persona.name, "Dr. Wong");
        assert_eq!(template.scenario.learning_objectives, vec!["Normalise testing"]);
        assert_eq!(catalog.position("clinic"), Some(0));
    }

    #[test]
    fn test_sample_catalog_file_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/scenarios.toml");
        let catalog = ScenarioCatalog::load(path).unwrap();
        let sam = catalog.get("group-project-deadline").unwrap();
        assert_eq!(sam.key(), ConversationKey::new("group-project-deadline", "classmate-sam-01"));
        assert_eq!(sam.persona.tactics.len(), 2);
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(ScenarioCatalog::from_toml_str("").is_err());
    }
}
