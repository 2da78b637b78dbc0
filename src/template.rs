use crate::column::{COL_CONVERTITA, normalize_header};
use crate::error::{DbError, Result};
use crate::table::Table;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

lazy_static! {
    static ref TOKEN_REGEX: Regex = Regex::new(r"\{\{|\}\}|\{([^{}]*)\}").unwrap();
}

/// Placeholders a template may reference
pub const PLACEHOLDERS: [&str; 5] = ["NOME", "COGNOME", "TELEFONO", "MQ", "INDIRIZZO"];

pub const DEFAULT_TEMPLATE_CONVERTITA: &str = "-{NOME} {COGNOME};\n\
    -{TELEFONO};\n\
    -{MQ};\n\
    -{INDIRIZZO};\n\
    (Già chiamato, si aspetta una chiamata in giornata)";

pub const DEFAULT_TEMPLATE_NON_CONV: &str = "-{NOME} {COGNOME};\n\
    -{TELEFONO};\n\
    -{MQ};\n\
    -{INDIRIZZO};\n\
    Passata non convertita, continuiamo a provare a contattarla.";

/// The two snippet templates, keyed by row disposition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Templates {
    /// Used for rows marked converted
    pub convertita: String,
    /// Used for every other row
    pub non_convertita: String,
}

impl Default for Templates {
    fn default() -> Self {
        Templates {
            convertita: DEFAULT_TEMPLATE_CONVERTITA.to_string(),
            non_convertita: DEFAULT_TEMPLATE_NON_CONV.to_string(),
        }
    }
}

impl Templates {
    /// Check both templates are non-blank and only use known placeholders.
    pub fn validate(&self) -> Result<()> {
        for (name, template) in [
            ("convertita", &self.convertita),
            ("non_convertita", &self.non_convertita),
        ] {
            if template.trim().is_empty() {
                return Err(DbError::EmptyTemplate(name));
            }
            for token in tokenize(template)? {
                if let Token::Field(field) = token {
                    known_placeholder(field)?;
                }
            }
        }
        Ok(())
    }
}

/// Normalized header name -> cell value, for one row
pub type FieldMap = BTreeMap<String, String>;

/// Collect the trimmed cell values of one row keyed by normalized header.
///
/// Blank headers are skipped. With duplicate headers the first column wins,
/// as in header lookup.
pub fn field_map(table: &Table, sheet_row: usize) -> Result<FieldMap> {
    let row = table.sheet_row(sheet_row)?;
    let mut fields = FieldMap::new();
    for (header, value) in table.headers().iter().zip(row) {
        let key = normalize_header(header);
        if key.is_empty() {
            continue;
        }
        fields.entry(key).or_insert_with(|| value.trim().to_string());
    }
    Ok(fields)
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Literal(&'a str),
    Field(&'a str),
}

fn tokenize(template: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut last = 0;

    for caps in TOKEN_REGEX.captures_iter(template) {
        let whole = caps.get(0).unwrap();
        push_literal(&mut tokens, &template[last..whole.start()])?;
        match caps.get(1) {
            Some(field) => tokens.push(Token::Field(field.as_str())),
            // "{{" or "}}"
            None => tokens.push(Token::Literal(&whole.as_str()[..1])),
        }
        last = whole.end();
    }
    push_literal(&mut tokens, &template[last..])?;
    Ok(tokens)
}

fn push_literal<'a>(tokens: &mut Vec<Token<'a>>, text: &'a str) -> Result<()> {
    if text.contains('{') || text.contains('}') {
        return Err(DbError::MalformedTemplate(format!(
            "unmatched brace in '{}'",
            text
        )));
    }
    if !text.is_empty() {
        tokens.push(Token::Literal(text));
    }
    Ok(())
}

fn known_placeholder(field: &str) -> Result<&str> {
    if field.is_empty() {
        return Err(DbError::MalformedTemplate("empty placeholder '{}'".to_string()));
    }
    PLACEHOLDERS
        .iter()
        .find(|p| **p == field)
        .copied()
        .ok_or_else(|| DbError::UnknownPlaceholder(field.to_string()))
}

/// Substitute `{NAME}` placeholders from `fields`; missing fields render empty.
pub fn fill(template: &str, fields: &FieldMap) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    for token in tokenize(template)? {
        match token {
            Token::Literal(text) => out.push_str(text),
            Token::Field(field) => {
                let name = known_placeholder(field)?;
                out.push_str(fields.get(name).map(String::as_str).unwrap_or(""));
            }
        }
    }
    Ok(out)
}

/// Render the snippet for one row
///
/// Rows with a non-blank `CONVERTITA` cell use the converted template; every
/// other row, including rows with no status at all, uses the not-converted one.
///
/// # Arguments
/// * `table` - Table holding the row
/// * `sheet_row` - 1-based sheet row (header is row 1)
/// * `templates` - Snippet templates
///
/// # Returns
/// * `Result<String>` - Rendered text, or a template/row error
pub fn render(table: &Table, sheet_row: usize, templates: &Templates) -> Result<String> {
    let fields = field_map(table, sheet_row)?;
    let converted = fields
        .get(COL_CONVERTITA)
        .is_some_and(|value| !value.is_empty());

    let template = if converted {
        &templates.convertita
    } else {
        &templates.non_convertita
    };
    fill(template, &fields)
}
