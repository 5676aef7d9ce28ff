//! Prompt templates for turning OCR text into an invoice record.
//!
//! The defaults live here as constants so tests can inspect them without a
//! running model. At start-up they are turned into a [`PromptTemplate`] value
//! that travels inside [`crate::config::ExtractionConfig`]; nothing reads the
//! constants at extraction time.
//!
//! ## Template syntax
//!
//! `{invoice_text}` is the only substitution slot. Literal braces, such as the
//! ones in the example schema, are written doubled (`{{` and `}}`). Any other
//! `{name}` or a lone brace is rejected when the template is constructed.

use crate::error::ScanError;

/// Name of the single substitution slot.
pub const INVOICE_TEXT_SLOT: &str = "invoice_text";

/// Default system message.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an invoice and receipt analysis tool. Your task is to extract the information in the given OCR output accurately and completely into structured JSON. Every field is required. If a value is missing, use an empty string (\"\"), null, 0 or 0.0 instead of leaving the field out. Output only the JSON, with no explanation or commentary.";

/// Default human message. Contains exactly one `{invoice_text}` slot; all other
/// braces are escaped.
pub const DEFAULT_HUMAN_TEMPLATE: &str = "OCR text:
{invoice_text}

Instructions:
1. Extract the following fields from the OCR text:
   - Store information (title, address, receipt number, date)
   - Customer information (name)
   - Line items; a receipt usually has more than one (product name, product code if present otherwise an empty string, quantity, unit price, line total)
   - Payment information (subtotal, overall tax rate (0.0 if no single rate is printed), total tax amount, rounding, grand total, amount paid, change)

2. The JSON output must have this shape (fill the values from the OCR text):
{{
  \"storeInfo\": {{
    \"title\": \"\",
    \"address\": \"\",
    \"receiptNumber\": \"\",
    \"date\": \"\"
  }},
  \"customerInfo\": {{
    \"name\": \"\"
  }},
  \"lineItems\": [
    {{
      \"productName\": \"\",
      \"productCode\": \"\",
      \"quantity\": 0,
      \"unitPrice\": 0.0,
      \"lineTotal\": 0.0
    }}
  ],
  \"paymentInfo\": {{
    \"subtotal\": 0.0,
    \"taxRate\": 0.0,
    \"taxAmount\": 0.0,
    \"rounding\": 0.0,
    \"grandTotal\": 0.0,
    \"amountPaid\": 0.0,
    \"change\": 0.0
  }}
}}";

/// The example schema exactly as the model sees it after rendering.
pub const EXAMPLE_SCHEMA: &str = r#"{
  "storeInfo": {
    "title": "",
    "address": "",
    "receiptNumber": "",
    "date": ""
  },
  "customerInfo": {
    "name": ""
  },
  "lineItems": [
    {
      "productName": "",
      "productCode": "",
      "quantity": 0,
      "unitPrice": 0.0,
      "lineTotal": 0.0
    }
  ],
  "paymentInfo": {
    "subtotal": 0.0,
    "taxRate": 0.0,
    "taxAmount": 0.0,
    "rounding": 0.0,
    "grandTotal": 0.0,
    "amountPaid": 0.0,
    "change": 0.0
  }
}"#;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot,
}

/// A two-message prompt template with one `{invoice_text}` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    system: String,
    human: Vec<Segment>,
}

/// The two messages sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub human: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        // The defaults are checked by `default_templates_are_valid`.
        Self::new(DEFAULT_SYSTEM_PROMPT, DEFAULT_HUMAN_TEMPLATE)
            .unwrap_or_else(|e| unreachable!("built-in prompt template is invalid: {e}"))
    }
}

impl PromptTemplate {
    /// Parse and validate a template pair.
    ///
    /// The system template may use escaped braces but no slot; the human
    /// template must contain `{invoice_text}` exactly once.
    pub fn new(system: &str, human: &str) -> Result<Self, ScanError> {
        let system_segments = parse(system).map_err(|e| invalid("system", e))?;
        if system_segments.contains(&Segment::Slot) {
            return Err(invalid(
                "system",
                format!("must not contain the {{{INVOICE_TEXT_SLOT}}} slot"),
            ));
        }

        let human = parse(human).map_err(|e| invalid("human", e))?;
        let slots = human.iter().filter(|s| **s == Segment::Slot).count();
        if slots != 1 {
            return Err(invalid(
                "human",
                format!("expected exactly one {{{INVOICE_TEXT_SLOT}}} slot, found {slots}"),
            ));
        }

        Ok(Self {
            system: join_literals(&system_segments),
            human,
        })
    }

    /// Replace the built-in system message, keeping the human template.
    pub fn with_system(self, system: &str) -> Result<Self, ScanError> {
        let human = self.human_source();
        Self::new(system, &human)
    }

    /// Replace the built-in human template, keeping the system message.
    pub fn with_human(self, human: &str) -> Result<Self, ScanError> {
        Self::new(&escape(&self.system), human)
    }

    /// The system message (braces already unescaped).
    pub fn system(&self) -> &str {
        &self.system
    }

    /// Substitute the OCR text. The text is inserted verbatim; braces inside
    /// it are not interpreted.
    pub fn render(&self, invoice_text: &str) -> RenderedPrompt {
        let mut human = String::with_capacity(invoice_text.len() + 2048);
        for segment in &self.human {
            match segment {
                Segment::Literal(s) => human.push_str(s),
                Segment::Slot => human.push_str(invoice_text),
            }
        }
        RenderedPrompt {
            system: self.system.clone(),
            human,
        }
    }

    fn human_source(&self) -> String {
        self.human
            .iter()
            .map(|s| match s {
                Segment::Literal(s) => escape(s),
                Segment::Slot => format!("{{{INVOICE_TEXT_SLOT}}}"),
            })
            .collect()
    }
}

fn invalid(which: &str, detail: impl std::fmt::Display) -> ScanError {
    ScanError::InvalidConfig(format!("{which} prompt template: {detail}"))
}

fn escape(s: &str) -> String {
    s.replace('{', "{{").replace('}', "}}")
}

fn join_literals(segments: &[Segment]) -> String {
    segments
        .iter()
        .filter_map(|s| match s {
            Segment::Literal(s) => Some(s.as_str()),
            Segment::Slot => None,
        })
        .collect()
}

fn parse(src: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = src.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(format!("unclosed '{{' at byte {pos}"));
                }
                if name.trim() != INVOICE_TEXT_SLOT {
                    return Err(format!(
                        "unknown slot {{{name}}} at byte {pos}; escape literal braces as {{{{ and }}}}"
                    ));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Slot);
            }
            '}' => return Err(format!("single '}}' at byte {pos}; escape it as }}}}")),
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}
