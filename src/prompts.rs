//! Prompts for invoice interpretation.
//!
//! Kept in one place so the target schema can be read, reviewed and tested
//! without a live model. Callers can override the system message via
//! [`crate::config::InvoiceConfig::system_prompt`]; the user message always
//! carries the schema below.

/// Default system message.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Expert invoice data extractor";

/// Target schema: flat header fields plus a repeatable `items` list.
pub const INVOICE_SCHEMA: &str = r#"{
    "invoice_number": "",
    "issue_date": "",
    "due_date": "",
    "currency": "",
    "supplier_name": "",
    "supplier_tax_id": "",
    "supplier_address": "",
    "customer_name": "",
    "customer_tax_id": "",
    "customer_address": "",
    "payment_method": "",
    "subtotal": "",
    "tax_rate": "",
    "tax_amount": "",
    "total": "",
    "items": [
        {
            "description": "",
            "quantity": "",
            "unit_price": "",
            "amount": ""
        }
    ]
}"#;

/// Build the user message that embeds the extracted invoice text.
pub fn invoice_prompt(invoice_text: &str) -> String {
    format!(
        "You are an invoice processing expert. Extract information from this invoice \
and return EXACTLY this JSON structure:\n{INVOICE_SCHEMA}\n\
Leave a field as an empty string when the invoice does not state it. \
Repeat the object inside \"items\" once per line item.\n\
Use the following invoice text:\n{invoice_text}\n\
Return ONLY the JSON without additional explanations."
    )
}
