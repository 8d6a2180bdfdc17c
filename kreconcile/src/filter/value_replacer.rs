use std::{borrow::Cow, ops::ControlFlow};

use anyhow::ensure;
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;

use crate::{
    collection::ResourceCollection,
    fieldpath::FieldPath,
    serde_ex,
    visit::{VisitMut as _, VisitorMut},
};

use super::target::{self, Target};

/// Replaces substrings, or regular expression matches, inside string values.
///
/// Only `kind` is rewritten unless `fieldPath` names another field or `allFields` opts into
/// every string value of the document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ValueReplacer {
    #[serde(default)]
    string_match: Option<String>,
    #[serde(default, with = "serde_ex::opt_string")]
    regex_match: Option<Regex>,
    replace: String,
    /// Maximum number of replacements within a single value, 0 for no limit.
    #[serde(default)]
    count: usize,
    #[serde(default, with = "serde_ex::opt_string")]
    field_path: Option<FieldPath>,
    #[serde(default)]
    all_fields: bool,
    #[serde(default)]
    target: Option<Target>,
}

impl ValueReplacer {
    pub fn validate(mut self) -> anyhow::Result<Self> {
        match (&self.string_match, &self.regex_match) {
            (Some(_), Some(_)) => anyhow::bail!("`stringMatch` and `regexMatch` are exclusive"),
            (None, None) => anyhow::bail!("one of `stringMatch` or `regexMatch` is required"),
            (Some(s), None) => ensure!(!s.is_empty(), "`stringMatch` cannot be empty"),
            (None, Some(_)) => {}
        }
        ensure!(
            !(self.all_fields && self.field_path.is_some()),
            "`fieldPath` and `allFields` are exclusive"
        );
        if !self.all_fields && self.field_path.is_none() {
            self.field_path = Some(FieldPath::field("kind"));
        }
        Ok(self)
    }

    fn replace<'a>(&self, s: &'a str) -> Cow<'a, str> {
        match (&self.string_match, &self.regex_match) {
            (Some(pat), _) if !s.contains(pat.as_str()) => Cow::Borrowed(s),
            (Some(pat), _) if self.count == 0 => Cow::Owned(s.replace(pat.as_str(), &self.replace)),
            (Some(pat), _) => Cow::Owned(s.replacen(pat.as_str(), &self.replace, self.count)),
            (None, Some(re)) => re.replacen(s, self.count, self.replace.as_str()),
            (None, None) => Cow::Borrowed(s),
        }
    }

    /// Rewrites `s` in place, returning whether it changed.
    fn replace_in(&self, s: &mut String) -> bool {
        let replaced = match self.replace(s) {
            Cow::Borrowed(_) => return false,
            Cow::Owned(replaced) => replaced,
        };
        if replaced == *s {
            return false;
        }
        *s = replaced;
        true
    }

    #[tracing::instrument(skip_all)]
    pub fn apply(&self, resources: &mut ResourceCollection) -> anyhow::Result<()> {
        let mut replaced = 0;
        for resource in resources.iter_mut() {
            if !target::selects(self.target.as_ref(), resource) {
                continue;
            }

            match &self.field_path {
                None => {
                    let mut visitor = StringReplacer {
                        replacer: self,
                        replaced: 0,
                    };
                    let _ = resource.root_mut().visit_with(&mut visitor);
                    replaced += visitor.replaced;
                }
                Some(path) => {
                    path.apply(resource.root_mut(), false, &mut |value| {
                        if let Value::String(s) = value {
                            replaced += usize::from(self.replace_in(s));
                        }
                        Ok(())
                    })?;
                }
            }
        }

        tracing::debug!(replaced, "replaced values");
        Ok(())
    }
}

struct StringReplacer<'a> {
    replacer: &'a ValueReplacer,
    replaced: usize,
}

impl VisitorMut for StringReplacer<'_> {
    type Break = std::convert::Infallible;

    fn visit_string(&mut self, s: &mut String) -> ControlFlow<Self::Break> {
        self.replaced += usize::from(self.replacer.replace_in(s));
        ControlFlow::Continue(())
    }
}
