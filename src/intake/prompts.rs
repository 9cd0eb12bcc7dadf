//! Stage instructions, the reply contract, and the summary template.

use std::path::Path;

use crate::error::ConfigError;
use crate::llm::ToolDefinition;

use super::stage::{StageId, StageRegistry};

/// Name of the tool the model calls to hand over summary requirements.
pub const SUMMARY_TOOL_NAME: &str = "record_summary_requirements";

/// Text of the synthetic tool result appended for each acknowledged call.
pub const TOOL_ACK_TEXT: &str = "Requirements recorded.";

/// Appended to every stage's instructions so replies decode as an
/// `IntakeResult`.
const REPLY_CONTRACT: &str = "\n\
RESPONSE FORMAT
Reply with ONLY a JSON object, no prose around it:
{
  \"reply_text\": \"your reply, question, or acknowledgment to the patient\",
  \"status\": \"in-progress\" | \"complete\" | \"alert\" | \"stop\",
  \"structured_record\": { \"demographics\": { \"age\": \"\", \"gender\": \"\" }, ... }
}
- Use \"in-progress\" while you still need information for this stage.
- Use \"complete\" once this stage's information is collected.
- Use \"alert\" if the patient indicates risk of harm to self or others.
- Use \"stop\" if the patient asks to end the conversation.
- structured_record carries everything learned so far, across all stages.";

const BASE: &str = "\
You are a calm, empathetic clinical intake assistant preparing a patient for \
a depression treatment consultation. Ask ONE question at a time, keep replies \
to 1-3 sentences, and acknowledge what the patient shares before moving on. \
Never diagnose or give medical advice.";

/// Embedded instruction body for a stage of the fixed catalogue.
pub fn stage_body(id: StageId) -> Option<&'static str> {
    let body = match id {
        StageId::GET_FAMILIAR => "\
CURRENT STAGE: Get Familiar
Greet the patient warmly, explain that you will ask some questions about their \
health, and collect their age and gender. Complete when both are known.",

        StageId::DEPRESSION_SEVERITY => "\
CURRENT STAGE: Depression Severity
Ask about mood, interest in activities, sleep, appetite, energy, concentration \
and feelings of worthlessness over the past two weeks, and how much these affect \
daily life. Complete when you can characterise severity.",

        StageId::ILLNESS_HISTORY => "\
CURRENT STAGE: Illness History
Ask when symptoms first started, how many episodes they have had, and whether \
they have been hospitalised for mental health. Complete when the history is clear.",

        StageId::ANTIDEPRESSANT_HISTORY => "\
CURRENT STAGE: Antidepressant History
Ask which antidepressants they have tried, for how long, at what dose, and why \
each was stopped. Complete when each past medication is accounted for.",

        StageId::CURRENT_MEDICATIONS => "\
CURRENT STAGE: Current Medications
Collect every medication and supplement they take now, with dose and frequency. \
Complete when the list is confirmed.",

        StageId::PROCEDURES => "\
CURRENT STAGE: Procedures
Ask about past treatments such as ECT, TMS, ketamine, or psychotherapy, and how \
well each worked. Complete when covered.",

        StageId::SUICIDE_RISK_FACTORS => "\
CURRENT STAGE: Suicide Risk Factors
Gently ask about thoughts of self-harm or suicide, past attempts, and current \
safety. If there is any current intent or plan, set status to \"alert\".",

        StageId::BIPOLAR_SCREEN => "\
CURRENT STAGE: Bipolar Screen
Ask about periods of unusually elevated mood, reduced need for sleep, racing \
thoughts, or impulsive behaviour. Complete when screened.",

        StageId::CONVERSATION_COMPLETED => "\
CURRENT STAGE: Conversation Completed
Thank the patient, briefly recap what was covered, and ask whether there is \
anything else they want the clinician to know. Complete when they have nothing \
to add.",

        StageId::STOP_INTERACTION => "\
CURRENT STAGE: Stop Interaction
The interview is ending early. If the patient may be at risk, urge them to \
contact emergency services or a crisis line now. Otherwise thank them and say \
goodbye. Set status to \"stop\".",

        _ => return None,
    };
    Some(body)
}

/// Full instructions for a stage: shared preamble, stage body, reply contract.
pub fn stage_instructions(body: &str) -> String {
    format!("{BASE}\n\n{}\n{REPLY_CONTRACT}", body.trim_end())
}

/// Registry of the embedded catalogue: 150 → … → 900, stop stage 1000.
pub fn default_registry() -> Result<StageRegistry, ConfigError> {
    let chain = [
        StageId::GET_FAMILIAR,
        StageId::DEPRESSION_SEVERITY,
        StageId::ILLNESS_HISTORY,
        StageId::ANTIDEPRESSANT_HISTORY,
        StageId::CURRENT_MEDICATIONS,
        StageId::PROCEDURES,
        StageId::SUICIDE_RISK_FACTORS,
        StageId::BIPOLAR_SCREEN,
        StageId::CONVERSATION_COMPLETED,
    ];
    let pairs = chain
        .iter()
        .map(|id| (*id, stage_instructions(stage_body(*id).unwrap_or_default())));
    let stop = stage_body(StageId::STOP_INTERACTION).unwrap_or_default();
    StageRegistry::from_ordered(pairs)?
        .with_stop_stage(StageId::STOP_INTERACTION, stage_instructions(stop))
}

/// Build a registry from `Prompt_NNNN_<Name>.md` files.
///
/// Files are chained in ascending id order; `Prompt_1000_*` becomes the stop
/// stage. File contents are used verbatim.
pub fn load_registry_from_dir(dir: &Path) -> Result<StageRegistry, ConfigError> {
    let mut prompts: Vec<(StageId, String)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(id) = prompt_file_id(name) else {
            tracing::debug!(file = name, "Skipping non-prompt file");
            continue;
        };
        prompts.push((id, std::fs::read_to_string(&path)?));
    }
    prompts.sort_by_key(|(id, _)| *id);

    let stop_index = prompts
        .iter()
        .position(|(id, _)| *id == StageId::STOP_INTERACTION);
    let stop = stop_index.map(|i| prompts.remove(i));

    tracing::info!(
        dir = %dir.display(),
        stages = prompts.len(),
        stop_stage = stop.is_some(),
        "Loaded stage prompts"
    );

    let registry = StageRegistry::from_ordered(prompts)?;
    match stop {
        Some((id, text)) => registry.with_stop_stage(id, text),
        None => Ok(registry),
    }
}

/// `Prompt_0150_Get_Familiar.md` → 150.
fn prompt_file_id(name: &str) -> Option<StageId> {
    let rest = name.strip_prefix("Prompt_")?;
    if !name.ends_with(".md") {
        return None;
    }
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok().map(StageId)
}

/// The single tool offered to the model during stage turns.
pub fn summary_requirements_tool() -> ToolDefinition {
    ToolDefinition {
        name: SUMMARY_TOOL_NAME.to_string(),
        description: "Record what the closing intake summary must cover once enough \
                      information has been gathered."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "objective": {"type": "string"},
                "variables": {"type": "array", "items": {"type": "string"}},
                "constraints": {"type": "array", "items": {"type": "string"}},
                "requirements": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["objective", "variables", "constraints", "requirements"]
        }),
    }
}

/// System prompt for the closing summary, parameterised by the gathered
/// requirements.
pub fn summary_prompt(requirements: &serde_json::Value) -> String {
    let reqs = serde_json::to_string_pretty(requirements).unwrap_or_else(|_| requirements.to_string());
    format!(
        "Based on the following requirements, write a concise clinical intake summary:\n\n{reqs}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::stage::Successor;

    #[test]
    fn default_registry_chains_150_to_900() {
        let registry = default_registry().unwrap();
        assert_eq!(registry.first(), StageId::GET_FAMILIAR);
        assert_eq!(registry.len(), 9);
        assert_eq!(
            registry.successor(StageId::GET_FAMILIAR).unwrap(),
            Successor::Stage(StageId::DEPRESSION_SEVERITY)
        );
        assert_eq!(
            registry.successor(StageId::CONVERSATION_COMPLETED).unwrap(),
            Successor::Terminal
        );
        assert_eq!(registry.stop_stage().unwrap().id, StageId::STOP_INTERACTION);
    }

    #[test]
    fn every_stage_carries_the_reply_contract() {
        let registry = default_registry().unwrap();
        for id in registry.chain() {
            let stage = registry.lookup(*id).unwrap();
            assert!(stage.instructions.contains("RESPONSE FORMAT"), "stage {id}");
            assert!(stage.instructions.contains("\"in-progress\""), "stage {id}");
        }
    }

    #[test]
    fn reply_contract_is_set_off_by_a_blank_line() {
        let text = stage_instructions("Ask about sleep.");
        assert!(text.contains("Ask about sleep.\n\nRESPONSE FORMAT\n"));
    }

    #[test]
    fn unknown_stage_has_no_body() {
        assert!(stage_body(StageId(151)).is_none());
    }

    #[test]
    fn prompt_file_names() {
        assert_eq!(prompt_file_id("Prompt_0150_Get_Familiar.md"), Some(StageId(150)));
        assert_eq!(prompt_file_id("Prompt_1000_Stop_Interaction.md"), Some(StageId(1000)));
        assert_eq!(prompt_file_id("Prompt_0150_Get_Familiar.txt"), None);
        assert_eq!(prompt_file_id("README.md"), None);
        assert_eq!(prompt_file_id("Prompt_abc.md"), None);
    }

    #[test]
    fn load_registry_from_dir_orders_by_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Prompt_0200_Depression_Severity.md"), "two").unwrap();
        std::fs::write(dir.path().join("Prompt_0150_Get_Familiar.md"), "one").unwrap();
        std::fs::write(dir.path().join("Prompt_1000_Stop_Interaction.md"), "stop").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = load_registry_from_dir(dir.path()).unwrap();
        assert_eq!(registry.chain(), &[StageId(150), StageId(200)]);
        assert_eq!(registry.lookup(StageId(150)).unwrap().instructions, "one");
        assert_eq!(registry.stop_stage().unwrap().instructions, "stop");
    }

    #[test]
    fn load_registry_from_empty_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_registry_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyRegistry));
    }

    #[test]
    fn summary_prompt_embeds_requirements() {
        let prompt = summary_prompt(&serde_json::json!({"objective": "handoff note"}));
        assert!(prompt.starts_with("Based on the following requirements"));
        assert!(prompt.contains("handoff note"));
    }

    #[test]
    fn tool_schema_requires_all_fields() {
        let tool = summary_requirements_tool();
        assert_eq!(tool.name, SUMMARY_TOOL_NAME);
        assert_eq!(tool.parameters["required"].as_array().unwrap().len(), 4);
    }
}
