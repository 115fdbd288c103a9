//! The structured requirements document produced at the end of a dialogue.
//!
//! Wire keys are camelCase to match the draft service schema. The document is
//! stored verbatim once received; [`RequirementsDoc::to_markdown`] is the only
//! transformation applied, and only for display.

use serde::{Deserialize, Serialize};

/// A single product feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// Short feature name.
    pub name: String,
    /// One-paragraph description.
    pub description: String,
}

/// A user story with its acceptance criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStory {
    /// The story itself ("As a ..., I want ..., so that ...").
    pub story: String,
    /// Conditions that make the story done.
    pub acceptance_criteria: Vec<String>,
}

/// One phase of the delivery roadmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapPhase {
    /// Phase name (e.g. "Phase 1 — MVP").
    pub name: String,
    /// What ships in this phase.
    pub items: Vec<String>,
}

/// The complete requirements document.
///
/// Produced atomically from a single service response; never partially
/// populated. The service is instructed to include 3–5 features and at
/// least 3 user stories, but those counts are not enforced on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsDoc {
    /// Document title.
    pub title: String,
    /// Executive summary.
    pub summary: String,
    /// The problem being solved.
    pub problem_statement: String,
    /// Who the product is for.
    pub target_users: String,
    /// Core features.
    pub features: Vec<Feature>,
    /// Functional requirements.
    pub functional_requirements: Vec<String>,
    /// Non-functional requirements.
    pub non_functional_requirements: Vec<String>,
    /// User stories with acceptance criteria.
    pub user_stories: Vec<UserStory>,
    /// Explicitly out of scope.
    pub out_of_scope: Vec<String>,
    /// Technical considerations and constraints.
    pub technical_considerations: Vec<String>,
    /// Phased delivery roadmap.
    pub roadmap: Vec<RoadmapPhase>,
    /// Assumptions the service made when details were missing.
    #[serde(default)]
    pub assumptions: Vec<String>,
}

impl RequirementsDoc {
    /// Render the document as markdown for terminal display or export.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("# {}\n\n{}\n", self.title, self.summary));

        push_section(&mut out, "Problem statement");
        out.push_str(&format!("{}\n", self.problem_statement));

        push_section(&mut out, "Target users");
        out.push_str(&format!("{}\n", self.target_users));

        push_section(&mut out, "Features");
        for feature in &self.features {
            out.push_str(&format!("- **{}** — {}\n", feature.name, feature.description));
        }

        push_section(&mut out, "Functional requirements");
        push_list(&mut out, &self.functional_requirements);

        push_section(&mut out, "Non-functional requirements");
        push_list(&mut out, &self.non_functional_requirements);

        push_section(&mut out, "User stories");
        for story in &self.user_stories {
            out.push_str(&format!("- {}\n", story.story));
            for criterion in &story.acceptance_criteria {
                out.push_str(&format!("  - {criterion}\n"));
            }
        }

        push_section(&mut out, "Out of scope");
        push_list(&mut out, &self.out_of_scope);

        push_section(&mut out, "Technical considerations");
        push_list(&mut out, &self.technical_considerations);

        push_section(&mut out, "Roadmap");
        for phase in &self.roadmap {
            out.push_str(&format!("### {}\n", phase.name));
            push_list(&mut out, &phase.items);
        }

        if !self.assumptions.is_empty() {
            push_section(&mut out, "Assumptions");
            push_list(&mut out, &self.assumptions);
        }

        out
    }
}

fn push_section(out: &mut String, heading: &str) {
    out.push_str(&format!("\n## {heading}\n"));
}

fn push_list(out: &mut String, items: &[String]) {
    for item in items {
        out.push_str(&format!("- {item}\n"));
    }
}
