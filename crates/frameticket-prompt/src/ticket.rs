use crate::types::{ContextPackage, TRUNCATION_MARKER};
use async_trait::async_trait;
use frameticket_common::{FrameTicketError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Story points a ticket may carry.
pub const FIBONACCI_POINTS: [u8; 6] = [1, 2, 3, 5, 8, 13];

/// An engineering ticket parsed from a generation response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    pub traceability: Vec<String>,
    /// Story points, always one of [`FIBONACCI_POINTS`].
    pub effort: u8,
    pub labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawTicket {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "acceptanceCriteria")]
    acceptance_criteria: Vec<String>,
    #[serde(default)]
    traceability: Vec<String>,
    #[serde(default, alias = "estimate", alias = "story_points")]
    effort: Value,
    #[serde(default)]
    labels: Vec<String>,
}

/// Transport that turns a prompt into raw response text
#[async_trait]
pub trait TicketBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Generation prompt for one package. Same package, same prompt.
pub fn render_prompt(package: &ContextPackage) -> String {
    let draft = &package.content;
    let omitted = draft.truncation.unwrap_or_default();
    let mut out = String::new();

    out.push_str("You are writing one engineering ticket for implementing a UI selection.\n\n");

    out.push_str("## Selection\n");
    out.push_str(&format!("Nodes: {}\n", draft.node_ids.join(", ")));
    if let Some(link) = &draft.frame_link {
        out.push_str(&format!("Frame link: {}\n", link));
    }
    if let Some(reference) = &draft.visual_reference {
        out.push_str(&format!("Visual reference: {}\n", reference));
    }
    if let Some(stack) = &draft.tech_stack {
        out.push_str(&format!("Tech stack: {}\n", stack));
    }

    out.push_str("\n## Text content\n");
    if draft.text.is_empty() {
        out.push_str("(none)\n");
    } else {
        out.push_str(&draft.text);
        out.push('\n');
    }

    out.push_str(&format!(
        "\n## Structure ({} nodes, depth {})\n",
        draft.structure.node_count, draft.structure.depth
    ));
    for line in &draft.structure.outline {
        out.push_str(line);
        out.push('\n');
    }
    if !draft.structure.components.is_empty() {
        out.push_str(&format!(
            "Reused components: {}\n",
            draft.structure.components.join(", ")
        ));
    }

    if !draft.styles.is_empty() {
        out.push_str("\n## Styles\n");
        for usage in &draft.styles {
            let token = usage.token.as_deref().unwrap_or("off-system");
            out.push_str(&format!(
                "- {} {} x{} ({})\n",
                usage.category.as_str(),
                usage.value,
                usage.count,
                token
            ));
        }
        if omitted.omitted_styles > 0 {
            out.push_str(&format!(
                "- … {} less used styles {}\n",
                omitted.omitted_styles, TRUNCATION_MARKER
            ));
        }
    }

    if let Some(report) = &draft.compliance {
        out.push_str(&format!(
            "\n## Design system compliance: {:.0}/100\n",
            report.overall_score
        ));
        for violation in &report.violations {
            out.push_str(&format!(
                "- [{:?}] {} on {}: expected {}, found {}\n",
                violation.severity,
                violation.category.as_str(),
                violation.node_id,
                violation.expected,
                violation.actual
            ));
        }
        if omitted.omitted_violations > 0 {
            out.push_str(&format!(
                "- … {} less severe violations {}\n",
                omitted.omitted_violations, TRUNCATION_MARKER
            ));
        }
    }

    out.push_str(
        "\n## Response format\n\
         Reply with a single JSON object:\n\
         {\"title\": string, \"description\": string, \"acceptance_criteria\": [string], \
         \"traceability\": [string], \"effort\": 1|2|3|5|8|13, \"labels\": [string]}\n",
    );
    out
}

/// Parse a generation response into a validated [`Ticket`].
pub fn parse_ticket(raw: &str, package: &ContextPackage) -> Result<Ticket> {
    let raw = raw.trim();
    let clean = raw
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let parsed: RawTicket = serde_json::from_str(clean)
        .or_else(|_| serde_json::from_str::<RawTicket>(raw))
        .map_err(|e| FrameTicketError::InvalidTicket(format!("response is not ticket JSON: {}", e)))?;

    let title = parsed.title.trim().to_string();
    if title.is_empty() {
        return Err(FrameTicketError::InvalidTicket("title is empty".to_string()));
    }

    let acceptance_criteria: Vec<String> = parsed
        .acceptance_criteria
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if acceptance_criteria.is_empty() {
        return Err(FrameTicketError::InvalidTicket(
            "at least one acceptance criterion is required".to_string(),
        ));
    }

    let effort = parse_effort(&parsed.effort)?;

    let mut traceability: Vec<String> = parsed
        .traceability
        .into_iter()
        .filter(|t| !t.trim().is_empty())
        .collect();
    if let Some(link) = &package.content.frame_link {
        if !traceability.contains(link) {
            traceability.push(link.clone());
        }
    }

    Ok(Ticket {
        title,
        description: parsed.description.trim().to_string(),
        acceptance_criteria,
        traceability,
        effort,
        labels: parsed.labels,
    })
}

/// Story points from a number or a t-shirt size (XS, S, M, L, XL).
pub fn parse_effort(value: &Value) -> Result<u8> {
    let points = match value {
        Value::Number(n) => n.as_u64().filter(|p| *p <= u8::MAX as u64).map(|p| p as u8),
        Value::String(s) => {
            let s = s.trim();
            match s.to_ascii_uppercase().as_str() {
                "XS" => Some(1),
                "S" => Some(2),
                "M" => Some(3),
                "L" => Some(5),
                "XL" => Some(8),
                _ => s.parse::<u8>().ok(),
            }
        }
        _ => None,
    };
    match points {
        Some(p) if FIBONACCI_POINTS.contains(&p) => Ok(p),
        _ => Err(FrameTicketError::InvalidTicket(format!(
            "effort {} is not one of {:?} or XS..XL",
            value, FIBONACCI_POINTS
        ))),
    }
}

/// Render, call the backend once, parse. Backend failures surface as `Generic`.
pub async fn generate_ticket(backend: &dyn TicketBackend, package: &ContextPackage) -> Result<Ticket> {
    let prompt = render_prompt(package);
    debug!(
        "Ticket prompt for selection {}: {} chars",
        package.content.selection_index,
        prompt.len()
    );

    let response = backend.generate(&prompt).await?;
    let ticket = parse_ticket(&response, package)?;

    info!(
        "🎫 Ticket for selection {}: \"{}\" ({} pts)",
        package.content.selection_index, ticket.title, ticket.effort
    );
    Ok(ticket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualityScorer;
    use crate::types::{ContextDraft, StructureSummary, StyleUsage, Truncation};
    use frameticket_common::ErrorKind;
    use frameticket_core::{DocumentSnapshot, Node, NodeKind, StyleCategory};
    use serde_json::json;
    use std::sync::Mutex;

    fn package() -> ContextPackage {
        let snapshot = DocumentSnapshot::new(Node::new("4:2", NodeKind::Frame));
        let draft = ContextDraft {
            selection_index: 0,
            snapshot_id: snapshot.id().clone(),
            node_ids: vec!["4:2".into()],
            text: "Checkout".into(),
            text_entries: vec!["Checkout".into()],
            structure: StructureSummary {
                node_count: 1,
                depth: 1,
                outline: vec!["frame \"Checkout\"".into()],
                ..StructureSummary::default()
            },
            styles: Vec::new(),
            visual_reference: None,
            tech_stack: Some("Vue".into()),
            frame_link: Some("https://design.test/f?node-id=4-2".into()),
            compliance: None,
            truncation: None,
        };
        let quality = QualityScorer::new().score(&draft);
        ContextPackage {
            content: draft,
            quality,
        }
    }

    struct ScriptedBackend {
        response: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TicketBackend for ScriptedBackend {
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.response.clone())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl TicketBackend for FailingBackend {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("backend unavailable")
        }
    }

    #[test]
    fn test_render_prompt_is_deterministic() {
        let package = package();
        let prompt = render_prompt(&package);
        assert_eq!(prompt, render_prompt(&package));
        assert!(prompt.contains("Frame link: https://design.test/f?node-id=4-2"));
        assert!(prompt.contains("Tech stack: Vue"));
        assert!(prompt.contains("\"acceptance_criteria\""));
    }

    #[test]
    fn test_render_prompt_notes_omitted_styles() {
        let mut package = package();
        package.content.styles = vec![StyleUsage {
            category: StyleCategory::Spacing,
            value: "16px".into(),
            token: Some("spacing-1".into()),
            count: 4,
        }];
        package.content.truncation = Some(Truncation {
            omitted_styles: 3,
            ..Truncation::default()
        });

        let prompt = render_prompt(&package);
        assert!(prompt.contains("- spacing 16px x4 (spacing-1)\n- … 3 less used styles [truncated]\n"));
        assert!(!prompt.contains("less severe violations"));
    }

    #[test]
    fn test_parse_fenced_ticket() {
        let raw = "```json\n{\"title\": \" Build checkout \", \"description\": \"d\", \
                   \"acceptance_criteria\": [\"Renders\", \" \"], \"effort\": \"M\", \
                   \"labels\": [\"ui\"]}\n```";
        let ticket = parse_ticket(raw, &package()).unwrap();
        assert_eq!(ticket.title, "Build checkout");
        assert_eq!(ticket.acceptance_criteria, vec!["Renders"]);
        assert_eq!(ticket.effort, 3);
        assert_eq!(ticket.traceability, vec!["https://design.test/f?node-id=4-2"]);
    }

    #[test]
    fn test_invalid_tickets() {
        let package = package();
        let cases = [
            "not json",
            r#"{"title": "", "acceptance_criteria": ["a"], "effort": 3}"#,
            r#"{"title": "t", "acceptance_criteria": [], "effort": 3}"#,
            r#"{"title": "t", "acceptance_criteria": ["a"], "effort": 4}"#,
            r#"{"title": "t", "acceptance_criteria": ["a"], "effort": "XXL"}"#,
        ];
        for raw in cases {
            let err = parse_ticket(raw, &package).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidTicket, "{}", raw);
        }
    }

    #[test]
    fn test_parse_effort() {
        assert_eq!(parse_effort(&json!(13)).unwrap(), 13);
        assert_eq!(parse_effort(&json!("xl")).unwrap(), 8);
        assert_eq!(parse_effort(&json!("5")).unwrap(), 5);
        assert!(parse_effort(&json!(null)).is_err());
        assert!(parse_effort(&json!(-1)).is_err());
    }

    #[tokio::test]
    async fn test_generate_ticket() {
        let backend = ScriptedBackend {
            response: json!({
                "title": "Checkout screen",
                "description": "Implement the checkout frame",
                "acceptance_criteria": ["Matches design"],
                "traceability": ["https://design.test/f?node-id=4-2"],
                "effort": 5,
                "labels": ["frontend"]
            })
            .to_string(),
            prompts: Mutex::new(Vec::new()),
        };
        let package = package();
        let ticket = generate_ticket(&backend, &package).await.unwrap();

        assert_eq!(ticket.effort, 5);
        assert_eq!(ticket.traceability.len(), 1);
        assert_eq!(backend.prompts.lock().unwrap().as_slice(), &[render_prompt(&package)]);
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_retried() {
        let err = generate_ticket(&FailingBackend, &package()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generic);
        assert!(err.to_string().contains("backend unavailable"));
    }
}
