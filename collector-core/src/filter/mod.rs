//! Boolean predicate tree compiled from inline text, file documents, an
//! environment variable, and CLI additions, then evaluated against message
//! context during a run (component C2).

mod dsl;
mod doc;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use thiserror::Error;

pub use doc::detect_format;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("invalid filter expression: {0}")]
    InvalidExpression(String),

    #[error("unknown predicate: {0}")]
    UnknownPredicate(String),

    #[error("unparseable regex in filter: {0}")]
    BadRegex(String),

    #[error("unparseable date specifier: {0}")]
    BadDate(String),

    #[error("filter file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fields a predicate can be evaluated against.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Field {
    Subject,
    Body,
    BodyHtml,
    From,
    To,
    Cc,
    Bcc,
    Participants,
    Folder,
    Header(String),
}

impl Field {
    pub fn parse(raw: &str) -> Result<Field, FilterError> {
        if let Some(name) = raw.strip_prefix("header:") {
            if name.is_empty() {
                return Err(FilterError::InvalidExpression(
                    "header field requires a name".into(),
                ));
            }
            return Ok(Field::Header(name.to_ascii_lowercase()));
        }
        match raw {
            "subject" => Ok(Field::Subject),
            "body" => Ok(Field::Body),
            "body_html" => Ok(Field::BodyHtml),
            "from" => Ok(Field::From),
            "to" => Ok(Field::To),
            "cc" => Ok(Field::Cc),
            "bcc" => Ok(Field::Bcc),
            "participants" => Ok(Field::Participants),
            "folder" => Ok(Field::Folder),
            other => Err(FilterError::InvalidExpression(format!(
                "unknown field: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RegexOptions {
    pub case_insensitive: bool,
    pub dot_matches_newline: bool,
    pub extended: bool,
}

fn compile_regex(pattern: &str, opts: RegexOptions) -> Result<Regex, FilterError> {
    RegexBuilder::new(pattern)
        .case_insensitive(opts.case_insensitive)
        .dot_matches_new_line(opts.dot_matches_newline)
        .ignore_whitespace(opts.extended)
        .build()
        .map_err(|err| FilterError::BadRegex(err.to_string()))
}

/// Strips a leading/trailing `/` delimiter pair used by MIME glob patterns.
fn strip_slash_delimiters(pattern: &str) -> &str {
    pattern
        .strip_prefix('/')
        .and_then(|p| p.strip_suffix('/'))
        .unwrap_or(pattern)
}

#[derive(Clone, Copy, Debug)]
pub enum RelativeUnit {
    Minute,
    Hour,
    Day,
    Week,
}

impl RelativeUnit {
    fn parse(raw: &str) -> Option<RelativeUnit> {
        match raw {
            "min" => Some(RelativeUnit::Minute),
            "h" => Some(RelativeUnit::Hour),
            "d" => Some(RelativeUnit::Day),
            "w" => Some(RelativeUnit::Week),
            _ => None,
        }
    }

    fn to_duration(self, amount: i64) -> chrono::Duration {
        match self {
            RelativeUnit::Minute => chrono::Duration::minutes(amount),
            RelativeUnit::Hour => chrono::Duration::hours(amount),
            RelativeUnit::Day => chrono::Duration::days(amount),
            RelativeUnit::Week => chrono::Duration::weeks(amount),
        }
    }
}

/// Either an absolute ISO-8601 timestamp or a signed relative offset such as
/// `-7d`, resolved against a configurable "now" at evaluation time.
#[derive(Clone, Debug)]
pub enum DateSpec {
    Absolute(DateTime<Utc>),
    Relative { signed_amount: i64, unit: RelativeUnit },
}

impl DateSpec {
    pub fn parse(raw: &str) -> Result<DateSpec, FilterError> {
        let trimmed = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(DateSpec::Absolute(parsed.with_timezone(&Utc)));
        }

        let (sign, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let split_at = rest.find(|c: char| !c.is_ascii_digit());
        let Some(split_at) = split_at else {
            return Err(FilterError::BadDate(raw.to_string()));
        };
        let (digits, unit_str) = rest.split_at(split_at);
        let amount: i64 = digits
            .parse()
            .map_err(|_| FilterError::BadDate(raw.to_string()))?;
        let unit = RelativeUnit::parse(unit_str).ok_or_else(|| FilterError::BadDate(raw.to_string()))?;
        Ok(DateSpec::Relative {
            signed_amount: sign * amount,
            unit,
        })
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DateSpec::Absolute(t) => *t,
            DateSpec::Relative { signed_amount, unit } => now + unit.to_duration(*signed_amount),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Predicate {
    Regex {
        field: Field,
        pattern: Regex,
    },
    Contains {
        field: Field,
        text: String,
        case_sensitive: bool,
    },
    HasAttachment,
    AttachmentMime(Vec<Regex>),
    FolderExact(String),
    FolderPrefix(String),
    FolderRegex(Regex),
    Vip(bool),
    ListUnsubscribe(bool),
    DateRange {
        start: DateSpec,
        end: Option<DateSpec>,
    },
    DateBetween {
        start: DateSpec,
        end: DateSpec,
    },
    DateBefore(DateSpec),
    DateAfter(DateSpec),
    DateOnOrBefore(DateSpec),
    DateOnOrAfter(DateSpec),
}

impl Predicate {
    pub fn regex(field: Field, pattern: &str, opts: RegexOptions) -> Result<Predicate, FilterError> {
        Ok(Predicate::Regex {
            field,
            pattern: compile_regex(pattern, opts)?,
        })
    }

    pub fn attachment_mime(patterns: &[String]) -> Result<Predicate, FilterError> {
        let compiled = patterns
            .iter()
            .map(|p| compile_regex(strip_slash_delimiters(p), RegexOptions { case_insensitive: true, ..Default::default() }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Predicate::AttachmentMime(compiled))
    }

    pub fn folder_regex(pattern: &str) -> Result<Predicate, FilterError> {
        Ok(Predicate::FolderRegex(compile_regex(
            pattern,
            RegexOptions::default(),
        )?))
    }
}

/// Evaluation-time view of a single candidate item. Headers are looked up
/// case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct MessageContext {
    pub subject: String,
    pub body: String,
    pub body_html: String,
    pub from: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
    pub folder: String,
    pub headers: HashMap<String, String>,
    pub has_attachment: bool,
    pub attachment_mimes: Vec<String>,
    pub vip: bool,
    pub list_unsubscribe: bool,
    pub date: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

impl MessageContext {
    fn field_text(&self, field: &Field) -> String {
        match field {
            Field::Subject => self.subject.clone(),
            Field::Body => self.body.clone(),
            Field::BodyHtml => self.body_html.clone(),
            Field::From => self.from.clone(),
            Field::To => self.to.clone(),
            Field::Cc => self.cc.clone(),
            Field::Bcc => self.bcc.clone(),
            Field::Participants => [&self.from, &self.to, &self.cc, &self.bcc].join(" "),
            Field::Folder => self.folder.to_ascii_lowercase(),
            Field::Header(name) => self
                .headers
                .iter()
                .find(|(k, _)| k.to_ascii_lowercase() == *name)
                .map(|(_, v)| v.clone())
                .unwrap_or_default(),
        }
    }
}

impl Predicate {
    fn evaluate(&self, ctx: &MessageContext) -> bool {
        match self {
            Predicate::Regex { field, pattern } => pattern.is_match(&ctx.field_text(field)),
            Predicate::Contains { field, text, case_sensitive } => {
                let haystack = ctx.field_text(field);
                if *case_sensitive {
                    haystack.contains(text.as_str())
                } else {
                    haystack.to_ascii_lowercase().contains(&text.to_ascii_lowercase())
                }
            }
            Predicate::HasAttachment => ctx.has_attachment,
            Predicate::AttachmentMime(patterns) => ctx
                .attachment_mimes
                .iter()
                .any(|mime| patterns.iter().any(|p| p.is_match(mime))),
            Predicate::FolderExact(name) => ctx.folder.to_ascii_lowercase() == name.to_ascii_lowercase(),
            Predicate::FolderPrefix(prefix) => ctx
                .folder
                .to_ascii_lowercase()
                .starts_with(&prefix.to_ascii_lowercase()),
            Predicate::FolderRegex(pattern) => pattern.is_match(&ctx.folder.to_ascii_lowercase()),
            Predicate::Vip(expected) => ctx.vip == *expected,
            Predicate::ListUnsubscribe(expected) => ctx.list_unsubscribe == *expected,
            Predicate::DateRange { start, end } => match ctx.date {
                Some(d) => {
                    let start = start.resolve(ctx.now);
                    d >= start && end.as_ref().map(|e| d <= e.resolve(ctx.now)).unwrap_or(true)
                }
                None => false,
            },
            Predicate::DateBetween { start, end } => match ctx.date {
                Some(d) => d >= start.resolve(ctx.now) && d <= end.resolve(ctx.now),
                None => false,
            },
            Predicate::DateBefore(spec) => ctx.date.is_some_and(|d| d < spec.resolve(ctx.now)),
            Predicate::DateAfter(spec) => ctx.date.is_some_and(|d| d > spec.resolve(ctx.now)),
            Predicate::DateOnOrBefore(spec) => ctx.date.is_some_and(|d| d <= spec.resolve(ctx.now)),
            Predicate::DateOnOrAfter(spec) => ctx.date.is_some_and(|d| d >= spec.resolve(ctx.now)),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Expr {
    Leaf(Predicate),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn evaluate(&self, ctx: &MessageContext) -> bool {
        match self {
            Expr::Leaf(predicate) => predicate.evaluate(ctx),
            Expr::And(children) => children.iter().all(|c| c.evaluate(ctx)),
            Expr::Or(children) => children.iter().any(|c| c.evaluate(ctx)),
            Expr::Not(inner) => !inner.evaluate(ctx),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CombinationMode {
    All,
    Any,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DefaultAction {
    Include,
    Exclude,
}

impl DefaultAction {
    fn as_bool(self) -> bool {
        matches!(self, DefaultAction::Include)
    }
}

/// A folder-restriction hint safely derivable from the compiled expression,
/// used to prune source enumeration before full evaluation runs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FolderHint {
    Exact(String),
    Prefix(String),
}

/// Derives a folder prefilter from `expr` when every branch of an `and`/`or`
/// is itself folder-restrictive (§4.2). Returns `None` when no safe hint can
/// be extracted, meaning every folder must be scanned.
pub fn derive_folder_prefilter(expr: &Expr) -> Option<Vec<FolderHint>> {
    match expr {
        Expr::Leaf(Predicate::FolderExact(name)) => Some(vec![FolderHint::Exact(name.clone())]),
        Expr::Leaf(Predicate::FolderPrefix(prefix)) => Some(vec![FolderHint::Prefix(prefix.clone())]),
        Expr::Leaf(_) => None,
        Expr::Not(_) => None,
        Expr::And(children) | Expr::Or(children) => {
            let mut hints = Vec::new();
            for child in children {
                hints.extend(derive_folder_prefilter(child)?);
            }
            Some(hints)
        }
    }
}

/// Merges a derived folder prefilter with operator-supplied include/exclude
/// lists (the include list always wins when non-empty).
pub fn merge_folder_prefilter(
    derived: Option<Vec<FolderHint>>,
    operator_include: &[String],
    operator_exclude: &[String],
) -> Option<Vec<FolderHint>> {
    if !operator_include.is_empty() {
        return Some(operator_include.iter().map(|n| FolderHint::Exact(n.clone())).collect());
    }
    let derived = derived?;
    Some(
        derived
            .into_iter()
            .filter(|hint| match hint {
                FolderHint::Exact(name) => !operator_exclude.iter().any(|e| e.eq_ignore_ascii_case(name)),
                FolderHint::Prefix(_) => true,
            })
            .collect(),
    )
}

/// The compiled, ready-to-evaluate filter built from all configured sources.
#[derive(Clone, Debug)]
pub struct CompiledExpression {
    expressions: Vec<Expr>,
    combination: CombinationMode,
    default_action: DefaultAction,
}

impl CompiledExpression {
    pub fn evaluate(&self, ctx: &MessageContext) -> bool {
        if self.expressions.is_empty() {
            return self.default_action.as_bool();
        }
        match self.combination {
            CombinationMode::All => self.expressions.iter().all(|e| e.evaluate(ctx)),
            CombinationMode::Any => self.expressions.iter().any(|e| e.evaluate(ctx)),
        }
    }

    pub fn folder_prefilter(&self) -> Option<Vec<FolderHint>> {
        if self.expressions.is_empty() {
            return None;
        }
        let mut hints = Vec::new();
        for expr in &self.expressions {
            hints.extend(derive_folder_prefilter(expr)?);
        }
        Some(hints)
    }
}

/// Accumulates expressions from inline text, a file document, an
/// environment variable, and CLI additions, in that precedence order (later
/// sources only ever add expressions; `all` combination narrows, `any`
/// widens — neither source can be "overridden away").
#[derive(Default)]
pub struct FilterBuilder {
    expressions: Vec<Expr>,
    combination: Option<CombinationMode>,
    default_action: Option<DefaultAction>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inline(mut self, text: &str) -> Result<Self, FilterError> {
        if !text.trim().is_empty() {
            self.expressions.push(dsl::parse(text)?);
        }
        Ok(self)
    }

    pub fn with_file(mut self, contents: &str) -> Result<Self, FilterError> {
        if !contents.trim().is_empty() {
            self.expressions.push(doc::parse_file(contents)?);
        }
        Ok(self)
    }

    pub fn with_env(mut self, value: Option<&str>) -> Result<Self, FilterError> {
        if let Some(text) = value.filter(|v| !v.trim().is_empty()) {
            self.expressions.push(dsl::parse(text)?);
        }
        Ok(self)
    }

    pub fn with_cli(mut self, additions: &[String]) -> Result<Self, FilterError> {
        for addition in additions {
            if !addition.trim().is_empty() {
                self.expressions.push(dsl::parse(addition)?);
            }
        }
        Ok(self)
    }

    pub fn combination(mut self, mode: CombinationMode) -> Self {
        self.combination = Some(mode);
        self
    }

    pub fn default_action(mut self, action: DefaultAction) -> Self {
        self.default_action = Some(action);
        self
    }

    pub fn build(self) -> CompiledExpression {
        CompiledExpression {
            expressions: self.expressions,
            combination: self.combination.unwrap_or(CombinationMode::All),
            default_action: self.default_action.unwrap_or(DefaultAction::Include),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> MessageContext {
        MessageContext {
            subject: "Invoice #42".to_string(),
            folder: "Archive/2024".to_string(),
            now: Utc::now(),
            ..Default::default()
        }
    }

    #[test]
    fn contains_is_case_insensitive_by_default() {
        let predicate = Predicate::Contains {
            field: Field::Subject,
            text: "invoice".to_string(),
            case_sensitive: false,
        };
        assert!(predicate.evaluate(&ctx()));
    }

    #[test]
    fn empty_expression_set_uses_default_action() {
        let compiled = FilterBuilder::new().default_action(DefaultAction::Exclude).build();
        assert!(!compiled.evaluate(&ctx()));
    }

    #[test]
    fn all_combination_requires_every_expression() {
        let compiled = FilterBuilder::new()
            .with_inline("contains(subject, \"invoice\")")
            .unwrap()
            .with_inline("folder_prefix(\"Inbox\")")
            .unwrap()
            .combination(CombinationMode::All)
            .build();
        assert!(!compiled.evaluate(&ctx()));
    }

    #[test]
    fn any_combination_matches_one_expression() {
        let compiled = FilterBuilder::new()
            .with_inline("contains(subject, \"invoice\")")
            .unwrap()
            .with_inline("folder_prefix(\"Inbox\")")
            .unwrap()
            .combination(CombinationMode::Any)
            .build();
        assert!(compiled.evaluate(&ctx()));
    }

    #[test]
    fn folder_prefilter_extracted_when_all_and_branches_restrictive() {
        let expr = Expr::And(vec![
            Expr::Leaf(Predicate::FolderExact("Archive".to_string())),
            Expr::Leaf(Predicate::FolderPrefix("Archive/20".to_string())),
        ]);
        let hints = derive_folder_prefilter(&expr).unwrap();
        assert_eq!(hints.len(), 2);
    }

    #[test]
    fn folder_prefilter_absent_when_a_branch_is_not_restrictive() {
        let expr = Expr::And(vec![
            Expr::Leaf(Predicate::FolderExact("Archive".to_string())),
            Expr::Leaf(Predicate::Contains {
                field: Field::Subject,
                text: "invoice".to_string(),
                case_sensitive: false,
            }),
        ]);
        assert!(derive_folder_prefilter(&expr).is_none());
    }

    #[test]
    fn relative_date_predicate_resolves_against_now() {
        let spec = DateSpec::parse("-7d").unwrap();
        let now = Utc::now();
        let resolved = spec.resolve(now);
        assert_eq!(resolved, now - chrono::Duration::days(7));
    }

    #[test]
    fn mime_pattern_strips_slash_delimiters() {
        let predicate = Predicate::attachment_mime(&["/image\\/.*/".to_string()]).unwrap();
        let mut message = ctx();
        message.attachment_mimes = vec!["image/png".to_string()];
        assert!(predicate.evaluate(&message));
    }
}
