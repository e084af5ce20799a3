//! WGSL templates with `{{label}}` placeholders.

use crate::{device::GraphicsDevice, shader::Shader};
use anyhow::{Result, anyhow, bail};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::{
    borrow::Cow,
    collections::{BTreeSet, HashMap},
    fmt,
};

/// A kernel-specific wrapper around a [`ShaderTemplate`] that knows the
/// replacements for its own placeholders.
pub trait SpecificShaderTemplate: fmt::Debug {
    /// Produces the WGSL source for this instance.
    ///
    /// # Errors
    /// Returns an error if the underlying template rejects the replacements.
    fn resolve(&self) -> Result<String>;

    /// Label for the compiled shader. Defaults to the [`fmt::Debug`] output,
    /// which includes any parameters of the instance.
    fn label(&self) -> Cow<'static, str> {
        Cow::Owned(format!("{self:?}"))
    }

    /// Compiles the resolved source into a [`Shader`].
    ///
    /// # Errors
    /// See [`Self::resolve`] and [`Shader::from_wgsl_source`].
    fn compile(&self, graphics_device: &GraphicsDevice) -> Result<Shader> {
        let label = self.label();
        Shader::from_wgsl_source(graphics_device, self.resolve()?, &label)
    }
}

/// WGSL source containing placeholders of the form `{{label}}`, where the
/// label is a word of letters, digits and underscores.
#[derive(Clone, Debug)]
pub struct ShaderTemplate<'a> {
    source_code: &'a str,
    labels: BTreeSet<&'a str>,
}

lazy_static! {
    static ref PLACEHOLDER_REGEX: Regex = Regex::new(r"\{\{(\w+)\}\}").unwrap();
}

impl<'a> ShaderTemplate<'a> {
    pub fn new(source_code: &'a str) -> Self {
        let labels = PLACEHOLDER_REGEX
            .captures_iter(source_code)
            .filter_map(|captures| captures.get(1))
            .map(|label| label.as_str())
            .collect();
        Self {
            source_code,
            labels,
        }
    }

    /// The distinct placeholder labels of the template, in sorted order.
    pub fn labels(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.labels.iter().copied()
    }

    /// Substitutes every placeholder with the replacement given for its
    /// label. Placeholders inside the replacement strings are left as they
    /// are.
    ///
    /// # Errors
    /// Returns an error if a replacement names a label the template does not
    /// have, if a label is given twice, or if any label of the template is
    /// left without a replacement.
    pub fn resolve<'b>(
        &self,
        replacements: impl IntoIterator<Item = (&'b str, String)>,
    ) -> Result<String> {
        let mut replacement_map = HashMap::with_capacity(self.labels.len());

        for (label, replacement) in replacements {
            if !self.labels.contains(label) {
                bail!("Template has no placeholder `{{{{{label}}}}}`");
            }
            if replacement_map.insert(label, replacement).is_some() {
                bail!("Placeholder `{label}` given more than one replacement");
            }
        }

        let missing: Vec<_> = self
            .labels()
            .filter(|label| !replacement_map.contains_key(label))
            .collect();
        if !missing.is_empty() {
            return Err(anyhow!(
                "Missing replacements for placeholders: {}",
                missing.join(", ")
            ));
        }

        Ok(PLACEHOLDER_REGEX
            .replace_all(self.source_code, |captures: &Captures<'_>| {
                replacement_map[&captures[1]].clone()
            })
            .into_owned())
    }
}

/// Resolves the given template and checks the result with `naga`'s WGSL
/// front end and validator, panicking with the offending source and a
/// rendered diagnostic on failure. Used by the unit tests of each template.
pub fn validate_template(template: &impl SpecificShaderTemplate) {
    let source = template
        .resolve()
        .unwrap_or_else(|err| panic!("Could not resolve {template:?}: {err}"));

    let module = naga::front::wgsl::parse_str(&source).unwrap_or_else(|err| {
        eprintln!("{source}");
        panic!("{template:?} does not parse:\n{}", err.emit_to_string(&source))
    });

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    if let Err(err) = validator.validate(&module) {
        eprintln!("{source}");
        panic!("{template:?} is invalid:\n{}", err.emit_to_string(&source));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replacement(label: &'static str, value: &str) -> (&'static str, String) {
        (label, value.to_string())
    }

    #[test]
    fn should_collect_distinct_labels_in_order() {
        let cases: [(&str, &[&str]); 6] = [
            ("", &[]),
            ("{{size}}", &["size"]),
            ("{{size}} + {{size}}", &["size"]),
            ("{{b}}{{a}}", &["a", "b"]),
            ("{{{inner}}}_", &["inner"]),
            ("{{not a label}} {single}", &[]),
        ];
        for (source, expected) in cases {
            let template = ShaderTemplate::new(source);
            assert_eq!(template.labels().collect::<Vec<_>>(), expected, "{source}");
        }
    }

    #[test]
    fn should_resolve_every_occurrence_of_placeholder() {
        let template = ShaderTemplate::new("const N = {{n}}u;\nvar<private> m: u32 = {{n}}u;");
        let resolved = template.resolve([replacement("n", "512")]).unwrap();
        assert_eq!(resolved, "const N = 512u;\nvar<private> m: u32 = 512u;");
    }

    #[test]
    fn should_resolve_template_without_placeholders_to_itself() {
        let template = ShaderTemplate::new("fn main() {}");
        assert_eq!(template.resolve([]).unwrap(), "fn main() {}");
    }

    #[test]
    fn should_not_resolve_placeholders_inside_replacements() {
        let template = ShaderTemplate::new("{{a}} {{b}}");
        let resolved = template
            .resolve([replacement("a", "{{b}}"), replacement("b", "x")])
            .unwrap();
        assert_eq!(resolved, "{{b}} x");
    }

    #[test]
    fn should_reject_unknown_label() {
        let template = ShaderTemplate::new("{{group}}");
        assert!(
            template
                .resolve([replacement("group", "0"), replacement("binding", "1")])
                .is_err()
        );
    }

    #[test]
    fn should_reject_duplicate_replacement() {
        let template = ShaderTemplate::new("{{group}}");
        assert!(
            template
                .resolve([replacement("group", "0"), replacement("group", "1")])
                .is_err()
        );
    }

    #[test]
    fn should_name_missing_labels_in_error() {
        let template = ShaderTemplate::new("{{group}} {{binding}} {{size}}");
        let error = template
            .resolve([replacement("binding", "1")])
            .unwrap_err()
            .to_string();
        assert!(error.contains("group"));
        assert!(error.contains("size"));
        assert!(!error.contains("binding"));
    }
}
