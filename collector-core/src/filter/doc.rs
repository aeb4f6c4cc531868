//! JSON/YAML document schema for filter files, plus the format detector
//! that picks between JSON, YAML, and the DSL by content sniffing.

use serde::{Deserialize, Serialize};

use super::{DateSpec, Expr, Field, FilterError, Predicate, RegexOptions};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileFormat {
    Json,
    Yaml,
    Dsl,
}

/// Deterministic precedence: a leading `{`/`[` means JSON; otherwise try to
/// parse as YAML; anything else falls back to the DSL.
pub fn detect_format(contents: &str) -> FileFormat {
    match contents.trim_start().chars().next() {
        Some('{') | Some('[') => FileFormat::Json,
        _ => {
            if serde_yaml::from_str::<ExprDoc>(contents).is_ok() {
                FileFormat::Yaml
            } else {
                FileFormat::Dsl
            }
        }
    }
}

pub fn parse_file(contents: &str) -> Result<Expr, FilterError> {
    match detect_format(contents) {
        FileFormat::Json => {
            let doc: ExprDoc = serde_json::from_str(contents)
                .map_err(|err| FilterError::InvalidExpression(err.to_string()))?;
            doc.into_expr()
        }
        FileFormat::Yaml => {
            let doc: ExprDoc = serde_yaml::from_str(contents)
                .map_err(|err| FilterError::InvalidExpression(err.to_string()))?;
            doc.into_expr()
        }
        FileFormat::Dsl => super::dsl::parse(contents),
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegexOptionsDoc {
    pub case_insensitive: bool,
    pub dot_matches_newline: bool,
    pub extended: bool,
}

impl From<RegexOptionsDoc> for RegexOptions {
    fn from(doc: RegexOptionsDoc) -> Self {
        RegexOptions {
            case_insensitive: doc.case_insensitive,
            dot_matches_newline: doc.dot_matches_newline,
            extended: doc.extended,
        }
    }
}

/// Serializable mirror of `Expr`/`Predicate`, internally tagged by `type`
/// so the same shape round-trips through both JSON and YAML.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExprDoc {
    And { expressions: Vec<ExprDoc> },
    Or { expressions: Vec<ExprDoc> },
    Not { expression: Box<ExprDoc> },
    Regex {
        field: String,
        pattern: String,
        #[serde(default)]
        options: RegexOptionsDoc,
    },
    Contains {
        field: String,
        text: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    HasAttachment {},
    AttachmentMime { patterns: Vec<String> },
    FolderExact { name: String },
    FolderPrefix { name: String },
    FolderRegex { pattern: String },
    Vip { value: bool },
    ListUnsubscribe { value: bool },
    DateRange { start: String, end: Option<String> },
    DateBetween { start: String, end: String },
    DateBefore { value: String },
    DateAfter { value: String },
    DateOnOrBefore { value: String },
    DateOnOrAfter { value: String },
}

impl ExprDoc {
    pub fn into_expr(self) -> Result<Expr, FilterError> {
        Ok(match self {
            ExprDoc::And { expressions } => Expr::And(
                expressions
                    .into_iter()
                    .map(ExprDoc::into_expr)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            ExprDoc::Or { expressions } => Expr::Or(
                expressions
                    .into_iter()
                    .map(ExprDoc::into_expr)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            ExprDoc::Not { expression } => Expr::Not(Box::new(expression.into_expr()?)),
            ExprDoc::Regex { field, pattern, options } => {
                Expr::Leaf(Predicate::regex(Field::parse(&field)?, &pattern, options.into())?)
            }
            ExprDoc::Contains { field, text, case_sensitive } => Expr::Leaf(Predicate::Contains {
                field: Field::parse(&field)?,
                text,
                case_sensitive,
            }),
            ExprDoc::HasAttachment {} => Expr::Leaf(Predicate::HasAttachment),
            ExprDoc::AttachmentMime { patterns } => Expr::Leaf(Predicate::attachment_mime(&patterns)?),
            ExprDoc::FolderExact { name } => Expr::Leaf(Predicate::FolderExact(name)),
            ExprDoc::FolderPrefix { name } => Expr::Leaf(Predicate::FolderPrefix(name)),
            ExprDoc::FolderRegex { pattern } => Expr::Leaf(Predicate::folder_regex(&pattern)?),
            ExprDoc::Vip { value } => Expr::Leaf(Predicate::Vip(value)),
            ExprDoc::ListUnsubscribe { value } => Expr::Leaf(Predicate::ListUnsubscribe(value)),
            ExprDoc::DateRange { start, end } => Expr::Leaf(Predicate::DateRange {
                start: DateSpec::parse(&start)?,
                end: end.as_deref().map(DateSpec::parse).transpose()?,
            }),
            ExprDoc::DateBetween { start, end } => Expr::Leaf(Predicate::DateBetween {
                start: DateSpec::parse(&start)?,
                end: DateSpec::parse(&end)?,
            }),
            ExprDoc::DateBefore { value } => Expr::Leaf(Predicate::DateBefore(DateSpec::parse(&value)?)),
            ExprDoc::DateAfter { value } => Expr::Leaf(Predicate::DateAfter(DateSpec::parse(&value)?)),
            ExprDoc::DateOnOrBefore { value } => {
                Expr::Leaf(Predicate::DateOnOrBefore(DateSpec::parse(&value)?))
            }
            ExprDoc::DateOnOrAfter { value } => {
                Expr::Leaf(Predicate::DateOnOrAfter(DateSpec::parse(&value)?))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_json_by_leading_brace() {
        assert_eq!(detect_format(r#"{"type":"has_attachment"}"#), FileFormat::Json);
    }

    #[test]
    fn detects_yaml_when_not_json_and_parses() {
        let yaml = "type: folder_exact\nname: Archive\n";
        assert_eq!(detect_format(yaml), FileFormat::Yaml);
    }

    #[test]
    fn falls_back_to_dsl_when_neither_json_nor_yaml() {
        assert_eq!(detect_format("contains(subject, \"invoice\")"), FileFormat::Dsl);
    }

    #[test]
    fn json_document_round_trips_to_expr() {
        let json = r#"{
            "type": "and",
            "expressions": [
                {"type": "folder_exact", "name": "Archive"},
                {"type": "contains", "field": "subject", "text": "invoice"}
            ]
        }"#;
        let expr = parse_file(json).unwrap();
        assert!(matches!(expr, Expr::And(children) if children.len() == 2));
    }
}
