use cdtmap_core::CdtCode;

/// Produces the system instruction for a model.
pub trait PromptProvider: Send + Sync {
    fn system_prompt(&self, model: &str, catalog: &[CdtCode]) -> String;
}

/// User message wrapping the procedure narrative.
pub fn user_prompt(procedure_summary: &str) -> String {
    format!(
        "Please analyze this dental procedure summary and provide the appropriate CDT codes: {}",
        procedure_summary
    )
}

const RESPONSE_SHAPE: &str = r#"Please format your response as JSON with the following structure:
{
    "cdt_codes": [
        {
            "code": "D0120",
            "description": "Periodic oral evaluation - established patient",
            "confidence": "high"
        }
    ],
    "explanation": "Brief explanation of why these codes were selected"
}"#;

/// Built-in templates selected by model identifier, falling back to a generic one.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplatePrompts;

impl PromptProvider for TemplatePrompts {
    fn system_prompt(&self, model: &str, catalog: &[CdtCode]) -> String {
        let codes = catalog_lines(catalog);
        match model {
            "llama3:8b" => llama3_prompt(&codes),
            "phi:latest" => phi_prompt(&codes),
            _ => default_prompt(&codes),
        }
    }
}

fn catalog_lines(catalog: &[CdtCode]) -> String {
    catalog
        .iter()
        .map(|c| format!("- {}: {}", c.code, c.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn llama3_prompt(codes: &str) -> String {
    format!(
        r#"You are a dental billing assistant with access to a comprehensive database of CDT (Current Dental Terminology) codes. Given a procedure summary, return the appropriate CDT codes and descriptions from the official CDT code set.

Available CDT codes:
{codes}

{shape}

GUIDELINES:
1. Only use codes from the list above.
2. Match tooth type and surface count exactly (anterior vs posterior, one vs two surfaces).
3. Distinguish initial therapy from retreatment, upper (maxillary) from lower (mandibular).
4. If the summary describes more than one distinct service, return every relevant code.
5. Default to adult codes when the patient's age is not given."#,
        codes = codes,
        shape = RESPONSE_SHAPE,
    )
}

fn phi_prompt(codes: &str) -> String {
    format!(
        r#"You are a dental billing assistant. Read the procedure summary and answer with CDT codes.

CDT codes you may use:
{codes}

{shape}

Rules:
- Only use codes from the list above.
- If multiple codes apply, return all.
- If you are not sure, pick the closest code and set confidence to "low".
- Always explain your reasoning."#,
        codes = codes,
        shape = RESPONSE_SHAPE,
    )
}

fn default_prompt(codes: &str) -> String {
    format!(
        "You are a dental billing assistant. Use only the CDT codes provided below. Return a JSON object with the codes and a brief explanation.\n\nCDT CODES:\n{}\n\n{}",
        codes, RESPONSE_SHAPE
    )
}
