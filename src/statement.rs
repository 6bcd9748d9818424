//! Statement templating.
//!
//! Arguments are substituted textually: `?` placeholders become `@p1`, `@p2`, ... and
//! every marker bound by an argument is replaced with the argument's literal rendering.
//! Nothing is quoted or escaped, so this is not parameterization.
//!
//! ```rust
//! use hiveline::{
//!     Value,
//!     statement::{NamedValue, bind, template},
//! };
//!
//! let tmpl = template("select ? , ?");
//! assert_eq!(tmpl, "select @p1 , @p2");
//!
//! let args = NamedValue::positional([Value::from("x"), Value::from(42_i64)]);
//! assert_eq!(bind(&tmpl, &args), "select x , 42");
//! ```
use std::{collections::HashMap, sync::LazyLock};

use regex::{Captures, Regex};

use crate::value::Value;

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)").expect("marker pattern is valid"));

/// An argument bound either by name (`@name`) or by ordinal (`@p{ordinal}`).
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue {
    pub name: Option<String>,
    /// 1-based position.
    pub ordinal: usize,
    pub value: Value,
}

impl NamedValue {
    pub fn new(ordinal: usize, value: impl Into<Value>) -> Self {
        Self {
            name: None,
            ordinal,
            value: value.into(),
        }
    }

    pub fn named(name: impl Into<String>, ordinal: usize, value: impl Into<Value>) -> Self {
        Self {
            name: Some(name.into()),
            ordinal,
            value: value.into(),
        }
    }

    /// Numbers `values` from 1.
    pub fn positional(values: impl IntoIterator<Item = Value>) -> Vec<NamedValue> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, value)| NamedValue::new(i + 1, value))
            .collect()
    }

    fn marker(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("p{}", self.ordinal),
        }
    }
}

/// Rewrites each `?`, left to right, into `@p1`, `@p2`, ...
pub fn template(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 8);
    let mut ordinal = 0;
    for c in query.chars() {
        if c == '?' {
            ordinal += 1;
            out.push_str(&format!("@p{ordinal}"));
        } else {
            out.push(c);
        }
    }
    out
}

/// Replaces every whole-token marker bound in `args`. Unbound markers are kept.
pub fn bind(template: &str, args: &[NamedValue]) -> String {
    if args.is_empty() {
        return template.to_string();
    }

    let bound: HashMap<String, String> = args
        .iter()
        .map(|arg| (arg.marker(), arg.value.to_string()))
        .collect();

    MARKER_RE
        .replace_all(template, |caps: &Captures| match bound.get(&caps[1]) {
            Some(literal) => literal.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// A templated statement, bound again on every execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    template: String,
}

impl PreparedStatement {
    pub fn new(query: &str) -> Self {
        Self {
            template: template(query),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn bind(&self, args: &[NamedValue]) -> String {
        bind(&self.template, args)
    }
}
