//! Replace `sub` markers in benchmark prose with resolved values.
//!
//! Text is treated as an XML fragment whose default namespace is XCCDF 1.2.
//! Markers in the XCCDF 1.1 or 1.2 namespace are replaced by a text node;
//! everything else is copied through event by event. Either the whole text
//! resolves or an error is returned, never partial output.

pub mod benchmark;

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use ovaleval_types::SubstitutionError;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, QName, ResolveResult};
use quick_xml::{NsReader, Writer};

pub use benchmark::{
    Benchmark, LocalizedText, PlainText, Policy, Profile, RefineValue, SetValue, ValueInstance,
    XccdfValue,
};

pub const XCCDF_1_1_NS: &str = "http://checklists.nist.gov/xccdf/1.1";
pub const XCCDF_1_2_NS: &str = "http://checklists.nist.gov/xccdf/1.2";
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

const WRAPPER: &str = "ovaleval-fragment";
const MARKER: &[u8] = b"sub";

/// Lookups a substitution needs from benchmark content.
pub trait SubstitutionSource {
    /// Whether `id` names a value item (as opposed to a plain-text block).
    fn is_value(&self, id: &str) -> bool;
    fn value_title(&self, id: &str, lang: Option<&str>) -> Option<&str>;
    /// The value bound under the active profile.
    fn bound_value(&self, id: &str) -> Option<&str>;
    fn plain_text(&self, id: &str) -> Option<&str>;
}

/// Which processing phase the text is rendered for; drives `use="legacy"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessingMode(u8);

impl ProcessingMode {
    pub const TAILORING: Self = Self(1);
    pub const DOCUMENT_GENERATION: Self = Self(2);
    pub const ASSESSMENT: Self = Self(4);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for ProcessingMode {
    fn default() -> Self {
        Self::DOCUMENT_GENERATION | Self::ASSESSMENT
    }
}

impl BitOr for ProcessingMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::TAILORING, "tailoring"),
            (Self::DOCUMENT_GENERATION, "document"),
            (Self::ASSESSMENT, "assessment"),
        ]
        .into_iter()
        .filter(|(m, _)| self.contains(*m))
        .map(|(_, n)| n)
        .collect();
        f.write_str(&names.join("|"))
    }
}

/// Accepts `tailoring`, `document`, `assessment`, combined with `|` or `,`.
impl FromStr for ProcessingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mode = ProcessingMode(0);
        for part in s.split(['|', ',']).map(str::trim).filter(|p| !p.is_empty()) {
            mode = mode
                | match part.to_ascii_lowercase().as_str() {
                    "tailoring" => Self::TAILORING,
                    "document" | "document_generation" | "document-generation" => {
                        Self::DOCUMENT_GENERATION
                    }
                    "assessment" => Self::ASSESSMENT,
                    other => return Err(format!("unknown processing mode '{}'", other)),
                };
        }
        if mode.0 == 0 {
            return Err("empty processing mode".to_string());
        }
        Ok(mode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub text: String,
    /// Non-fatal problems met along the way, in document order.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Substituter {
    mode: ProcessingMode,
    language: Option<String>,
}

impl Substituter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Preferred `xml:lang` for value titles.
    pub fn with_language(mut self, lang: impl Into<String>) -> Self {
        self.language = Some(lang.into());
        self
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    pub fn run<S>(&self, text: &str, source: &S) -> Result<Substitution, SubstitutionError>
    where
        S: SubstitutionSource + ?Sized,
    {
        let wrapped = format!(
            r#"<{WRAPPER} xmlns="{XCCDF_1_2_NS}" xmlns:xhtml="{XHTML_NS}">{text}</{WRAPPER}>"#
        );
        let mut reader = NsReader::from_str(&wrapped);
        let mut writer = Writer::new(Vec::with_capacity(text.len()));
        let mut warnings = vec![];
        let mut depth = 0usize;
        let mut replaced = 0usize;

        loop {
            let (ns, event) = reader.read_resolved_event().map_err(malformed)?;
            match event {
                Event::Eof => break,
                Event::Start(e) => {
                    depth += 1;
                    if depth == 1 {
                        continue;
                    }
                    if is_marker(&ns, &e) {
                        let end = e.name().as_ref().to_vec();
                        let span = reader.read_to_end(QName(&end)).map_err(malformed)?;
                        depth -= 1;
                        let text = self.resolve(&e, span.start < span.end, source, &mut warnings)?;
                        write(&mut writer, literal(&text))?;
                        replaced += 1;
                    } else {
                        write(&mut writer, Event::Start(e))?;
                    }
                }
                Event::Empty(e) => {
                    if is_marker(&ns, &e) {
                        let text = self.resolve(&e, false, source, &mut warnings)?;
                        write(&mut writer, literal(&text))?;
                        replaced += 1;
                    } else {
                        write(&mut writer, Event::Empty(e))?;
                    }
                }
                Event::End(e) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        continue;
                    }
                    write(&mut writer, Event::End(e))?;
                }
                other => write(&mut writer, other)?,
            }
        }

        let text = String::from_utf8(writer.into_inner()).map_err(malformed)?;
        tracing::debug!(replaced, warnings = warnings.len(), "substitution done");
        Ok(Substitution { text, warnings })
    }

    fn resolve<S>(
        &self,
        marker: &BytesStart<'_>,
        has_content: bool,
        source: &S,
        warnings: &mut Vec<String>,
    ) -> Result<String, SubstitutionError>
    where
        S: SubstitutionSource + ?Sized,
    {
        let idref = attribute(marker, "idref")?
            .filter(|s| !s.is_empty())
            .ok_or(SubstitutionError::MissingIdref)?;
        if has_content {
            warn(
                warnings,
                format!("sub/@idref='{}' SHALL NOT have any content; content dropped", idref),
            );
        }

        let resolved = if source.is_value(&idref) {
            let requested = attribute(marker, "use")?;
            let use_as = match requested.as_deref() {
                None | Some("legacy") if self.mode.contains(ProcessingMode::TAILORING) => "title",
                None | Some("legacy") => "value",
                Some(other) => other,
            };
            if use_as == "title" {
                source.value_title(&idref, self.language.as_deref())
            } else {
                if use_as != "value" {
                    warn(
                        warnings,
                        format!(
                            "sub/@idref='{}' has incorrect @use='{}'; using 'value' instead",
                            idref, use_as
                        ),
                    );
                }
                source.bound_value(&idref)
            }
        } else {
            source.plain_text(&idref)
        };

        resolved
            .map(str::to_string)
            .ok_or(SubstitutionError::Unresolved(idref))
    }
}

/// Substitute with the default processing mode, discarding warnings.
pub fn substitute<S>(text: &str, source: &S) -> Result<String, SubstitutionError>
where
    S: SubstitutionSource + ?Sized,
{
    Substituter::new().run(text, source).map(|s| s.text)
}

/// Replacement text escapes markup characters only; quotes stay literal.
fn literal(text: &str) -> Event<'_> {
    Event::Text(BytesText::from_escaped(partial_escape(text)))
}

fn is_marker(ns: &ResolveResult<'_>, element: &BytesStart<'_>) -> bool {
    let recognized = match ns {
        ResolveResult::Bound(Namespace(uri)) => {
            *uri == XCCDF_1_2_NS.as_bytes() || *uri == XCCDF_1_1_NS.as_bytes()
        }
        _ => false,
    };
    recognized && element.local_name().as_ref() == MARKER
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>, SubstitutionError> {
    match element.try_get_attribute(name).map_err(malformed)? {
        Some(attr) => Ok(Some(attr.unescape_value().map_err(malformed)?.into_owned())),
        None => Ok(None),
    }
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), SubstitutionError> {
    writer.write_event(event).map_err(malformed)
}

fn warn(warnings: &mut Vec<String>, message: String) {
    tracing::warn!("{}", message);
    warnings.push(message);
}

fn malformed(e: impl fmt::Display) -> SubstitutionError {
    SubstitutionError::Malformed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_document_and_assessment() {
        let m = ProcessingMode::default();
        assert!(m.contains(ProcessingMode::ASSESSMENT));
        assert!(m.contains(ProcessingMode::DOCUMENT_GENERATION));
        assert!(!m.contains(ProcessingMode::TAILORING));
        assert_eq!(m.bits(), 6);
        assert_eq!(m.to_string(), "document|assessment");
    }

    #[test]
    fn parses_mode_lists() {
        assert_eq!(
            "tailoring".parse::<ProcessingMode>().unwrap(),
            ProcessingMode::TAILORING
        );
        assert_eq!(
            "Document, assessment".parse::<ProcessingMode>().unwrap(),
            ProcessingMode::default()
        );
        assert!("".parse::<ProcessingMode>().is_err());
        assert!("review".parse::<ProcessingMode>().is_err());
    }

    struct Fixed;

    impl SubstitutionSource for Fixed {
        fn is_value(&self, id: &str) -> bool {
            id == "v"
        }
        fn value_title(&self, _: &str, _: Option<&str>) -> Option<&str> {
            Some("Title")
        }
        fn bound_value(&self, _: &str) -> Option<&str> {
            Some("a<b")
        }
        fn plain_text(&self, id: &str) -> Option<&str> {
            (id == "t").then_some("plain")
        }
    }

    #[test]
    fn replacement_text_is_escaped() {
        let out = substitute(r#"x <sub idref="v"/> y"#, &Fixed).unwrap();
        assert_eq!(out, "x a&lt;b y");
    }

    #[test]
    fn markup_passes_through() {
        let text = r#"<xhtml:b>bold</xhtml:b> &amp; <sub idref="t"/><!-- c -->"#;
        assert_eq!(
            substitute(text, &Fixed).unwrap(),
            "<xhtml:b>bold</xhtml:b> &amp; plain<!-- c -->"
        );
    }

    #[test]
    fn foreign_namespace_sub_is_not_a_marker() {
        let text = r#"<x:sub xmlns:x="urn:other" idref="v"/>"#;
        assert_eq!(substitute(text, &Fixed).unwrap(), text);
    }

    #[test]
    fn xccdf_1_1_markers_are_recognized() {
        let text = r#"<x:sub xmlns:x="http://checklists.nist.gov/xccdf/1.1" idref="t"/>"#;
        assert_eq!(substitute(text, &Fixed).unwrap(), "plain");
    }

    #[test]
    fn tailoring_uses_title_for_legacy() {
        let s = Substituter::new().with_mode(ProcessingMode::TAILORING);
        let out = s.run(r#"<sub idref="v" use="legacy"/>"#, &Fixed).unwrap();
        assert_eq!(out.text, "Title");
    }

    #[test]
    fn unknown_use_warns_and_uses_value() {
        let out = Substituter::new()
            .run(r#"<sub idref="v" use="bogus"/>"#, &Fixed)
            .unwrap();
        assert_eq!(out.text, "a&lt;b");
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("bogus"));
    }

    #[test]
    fn unbalanced_markup_is_malformed() {
        let err = substitute("<xhtml:b>open", &Fixed).unwrap_err();
        assert!(matches!(err, SubstitutionError::Malformed(_)));
    }

    #[test]
    fn empty_idref_is_missing() {
        assert_eq!(
            substitute(r#"<sub idref=""/>"#, &Fixed).unwrap_err(),
            SubstitutionError::MissingIdref
        );
    }
}
