//! Action templates with named placeholders.
//!
//! Templates use `${name}` placeholders. Built-in names expose the task's
//! paths, `${program.NAME}` expands to a resolved executable, and any other
//! name must be supplied as a task parameter. `$$` yields a literal `$`; a
//! `$` not followed by `{` is passed through so shell variables survive.

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use shell_quote::{QuoteRefExt, Sh};
use thiserror::Error;

use crate::params::Parameters;

/// Path references available to every action template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// First target, absolute.
    Target,
    /// Every target, space separated.
    Targets,
    /// Directory holding the first target.
    TargetDir,
    /// File name of the first target without its extension.
    TargetFilebase,
    /// First source, absolute.
    Source,
    /// Every source, space separated.
    Sources,
    /// Directory holding the first source.
    SourceDir,
    /// File name of the first source without its extension.
    SourceFilebase,
}

impl Builtin {
    fn parse(head: &str, attr: Option<&str>) -> Option<Self> {
        match (head, attr) {
            ("TARGET", None) => Some(Self::Target),
            ("TARGETS", None) => Some(Self::Targets),
            ("TARGET", Some("dir")) => Some(Self::TargetDir),
            ("TARGET", Some("filebase")) => Some(Self::TargetFilebase),
            ("SOURCE", None) => Some(Self::Source),
            ("SOURCES", None) => Some(Self::Sources),
            ("SOURCE", Some("dir")) => Some(Self::SourceDir),
            ("SOURCE", Some("filebase")) => Some(Self::SourceFilebase),
            _ => None,
        }
    }

    /// Whether the placeholder reads the task's sources.
    #[must_use]
    pub const fn needs_source(self) -> bool {
        matches!(
            self,
            Self::Source | Self::Sources | Self::SourceDir | Self::SourceFilebase
        )
    }
}

/// A parsed `${...}` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// A built-in path reference.
    Builtin(Builtin),
    /// `${program.NAME}`: the resolved executable for a required program.
    Program(String),
    /// A task parameter.
    Param(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// Errors raised while parsing or rendering a template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// A `${` without its closing brace.
    #[error("unterminated placeholder starting at offset {offset}")]
    Unterminated {
        /// Character offset of the `$`.
        offset: usize,
    },
    /// A placeholder name that is not an identifier.
    #[error("invalid placeholder name '{name}'")]
    InvalidName {
        /// The offending name.
        name: String,
    },
    /// A placeholder with no value at render time.
    #[error("no value for placeholder '{name}'")]
    MissingValue {
        /// The placeholder name.
        name: String,
    },
    /// The rendered command cannot be split into shell words.
    #[error("rendered command is not valid shell: {snippet}")]
    InvalidCommand {
        /// The full rendered command.
        command: String,
        /// A short prefix of the command for display.
        snippet: String,
    },
}

/// Values a template is rendered against.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Absolute target paths.
    pub targets: &'a [Utf8PathBuf],
    /// Absolute source paths.
    pub sources: &'a [Utf8PathBuf],
    /// Task parameters.
    pub params: &'a Parameters,
    /// Program name to invocation text.
    pub programs: &'a IndexMap<String, String>,
    /// Project root for relative path parameters.
    pub root: &'a Utf8Path,
}

/// A parsed action template.
///
/// # Examples
///
/// ```
/// use simbuild::ir::ActionTemplate;
///
/// let template = ActionTemplate::parse("mesher ${SOURCE} --size ${size}").expect("parse");
/// assert_eq!(template.param_names().collect::<Vec<_>>(), vec!["size"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTemplate {
    text: String,
    segments: Vec<Segment>,
}

impl ActionTemplate {
    /// Parse `text` into literal and placeholder segments.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] for unterminated or malformed placeholders.
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let chars: Vec<char> = text.chars().collect();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut i = 0;
        while let Some(&ch) = chars.get(i) {
            if ch != '$' {
                literal.push(ch);
                i += 1;
                continue;
            }
            match chars.get(i + 1) {
                Some('$') => {
                    literal.push('$');
                    i += 2;
                }
                Some('{') => {
                    let close = find_closing_brace(&chars, i + 2)
                        .ok_or(TemplateError::Unterminated { offset: i })?;
                    let name: String = chars.iter().skip(i + 2).take(close - i - 2).collect();
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(parse_placeholder(name.trim())?));
                    i = close + 1;
                }
                _ => {
                    literal.push('$');
                    i += 1;
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self {
            text: text.to_owned(),
            segments,
        })
    }

    /// The template text as declared.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Iterate over every placeholder in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(placeholder) => Some(placeholder),
            Segment::Literal(_) => None,
        })
    }

    /// Iterate over the parameter names the template references.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.placeholders().filter_map(|placeholder| match placeholder {
            Placeholder::Param(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Iterate over the program names the template references.
    pub fn program_names(&self) -> impl Iterator<Item = &str> {
        self.placeholders().filter_map(|placeholder| match placeholder {
            Placeholder::Program(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Whether any placeholder needs at least one source.
    #[must_use]
    pub fn needs_source(&self) -> bool {
        self.placeholders()
            .any(|placeholder| matches!(placeholder, Placeholder::Builtin(b) if b.needs_source()))
    }

    /// Render the template into a shell command.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingValue`] when a placeholder has no
    /// value and [`TemplateError::InvalidCommand`] when the result does not
    /// split into shell words.
    pub fn render(&self, ctx: &RenderContext<'_>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.text.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(placeholder) => out.push_str(&resolve(placeholder, ctx)?),
            }
        }
        if has_unmatched_backticks(&out) || shlex::split(&out).is_none() {
            let snippet = out.chars().take(160).collect();
            return Err(TemplateError::InvalidCommand {
                command: out,
                snippet,
            });
        }
        Ok(out)
    }
}

fn has_unmatched_backticks(s: &str) -> bool {
    s.chars().filter(|&c| c == '`').count().rem_euclid(2) != 0
}

fn find_closing_brace(chars: &[char], from: usize) -> Option<usize> {
    chars
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, c)| **c == '}')
        .map(|(idx, _)| idx)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn parse_placeholder(name: &str) -> Result<Placeholder, TemplateError> {
    let invalid = || TemplateError::InvalidName {
        name: name.to_owned(),
    };
    let (head, attr) = match name.split_once('.') {
        Some((head, attr)) => (head, Some(attr)),
        None => (name, None),
    };
    if !is_identifier(head) || attr.is_some_and(|a| !is_identifier(a)) {
        return Err(invalid());
    }
    if matches!(head, "TARGET" | "TARGETS" | "SOURCE" | "SOURCES") {
        return Builtin::parse(head, attr)
            .map(Placeholder::Builtin)
            .ok_or_else(invalid);
    }
    match (head, attr) {
        ("program", Some(program)) => Ok(Placeholder::Program(program.to_owned())),
        (_, None) => Ok(Placeholder::Param(head.to_owned())),
        (_, Some(_)) => Err(invalid()),
    }
}

fn quote(path: &Utf8Path) -> String {
    // Utf8Path guarantees UTF-8, and shell quoting should preserve it.
    let bytes: Vec<u8> = path.as_str().quoted(Sh);
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(&err.into_bytes()).into_owned(),
    }
}

fn quote_all(paths: &[Utf8PathBuf]) -> String {
    paths
        .iter()
        .map(|path| quote(path))
        .collect::<Vec<_>>()
        .join(" ")
}

fn first<'p>(paths: &'p [Utf8PathBuf], name: &str) -> Result<&'p Utf8Path, TemplateError> {
    paths
        .first()
        .map(Utf8PathBuf::as_path)
        .ok_or_else(|| TemplateError::MissingValue {
            name: name.to_owned(),
        })
}

fn parent_of(path: &Utf8Path) -> &Utf8Path {
    path.parent().unwrap_or_else(|| Utf8Path::new("."))
}

fn filebase(path: &Utf8Path) -> String {
    quote(Utf8Path::new(path.file_stem().unwrap_or_default()))
}

fn resolve(placeholder: &Placeholder, ctx: &RenderContext<'_>) -> Result<String, TemplateError> {
    let value = match placeholder {
        Placeholder::Builtin(builtin) => match builtin {
            Builtin::Target => quote(first(ctx.targets, "TARGET")?),
            Builtin::Targets => quote_all(ctx.targets),
            Builtin::TargetDir => quote(parent_of(first(ctx.targets, "TARGET.dir")?)),
            Builtin::TargetFilebase => filebase(first(ctx.targets, "TARGET.filebase")?),
            Builtin::Source => quote(first(ctx.sources, "SOURCE")?),
            Builtin::Sources => quote_all(ctx.sources),
            Builtin::SourceDir => quote(parent_of(first(ctx.sources, "SOURCE.dir")?)),
            Builtin::SourceFilebase => filebase(first(ctx.sources, "SOURCE.filebase")?),
        },
        Placeholder::Program(name) => ctx.programs.get(name).cloned().ok_or_else(|| {
            TemplateError::MissingValue {
                name: format!("program.{name}"),
            }
        })?,
        Placeholder::Param(name) => ctx
            .params
            .get(name)
            .map(|value| value.render(ctx.root))
            .ok_or_else(|| TemplateError::MissingValue { name: name.clone() })?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;
    use rstest::rstest;

    fn render(template: &str, params: &Parameters) -> Result<String, TemplateError> {
        let targets = vec![Utf8PathBuf::from("/b/mesh.inp"), Utf8PathBuf::from("/b/mesh.log")];
        let sources = vec![Utf8PathBuf::from("/p/mesh.py"), Utf8PathBuf::from("/b/part.cae")];
        let mut programs = IndexMap::new();
        programs.insert("cubit".to_owned(), "/opt/cubit/cubit".to_owned());
        let ctx = RenderContext {
            targets: &targets,
            sources: &sources,
            params,
            programs: &programs,
            root: Utf8Path::new("/p"),
        };
        ActionTemplate::parse(template)?.render(&ctx)
    }

    #[rstest]
    #[case("cp ${SOURCE} ${TARGET}", "cp /p/mesh.py /b/mesh.inp")]
    #[case("cat ${SOURCES} > ${TARGETS}", "cat /p/mesh.py /b/part.cae > /b/mesh.inp /b/mesh.log")]
    #[case("cd ${TARGET.dir} && ${program.cubit} ${SOURCE.filebase}", "cd /b && /opt/cubit/cubit mesh")]
    #[case("echo $HOME $$ ${TARGET.filebase}", "echo $HOME $ mesh")]
    fn renders_builtins(#[case] template: &str, #[case] expected: &str) {
        let rendered = render(template, &Parameters::new()).expect("render");
        assert_eq!(rendered, expected);
    }

    #[test]
    fn renders_parameters_and_resolves_paths() {
        let mut params = Parameters::new();
        params.insert("size".into(), ParamValue::Float(0.5));
        params.insert("input".into(), ParamValue::from(Utf8PathBuf::from("in.inp")));
        let rendered = render("mesh --size ${size} -i ${ input }", &params).expect("render");
        assert_eq!(rendered, "mesh --size 0.5 -i /p/in.inp");
    }

    #[test]
    fn quotes_paths_with_spaces() {
        let targets = vec![Utf8PathBuf::from("/b/with space/out")];
        let programs = IndexMap::new();
        let params = Parameters::new();
        let ctx = RenderContext {
            targets: &targets,
            sources: &[],
            params: &params,
            programs: &programs,
            root: Utf8Path::new("/p"),
        };
        let rendered = ActionTemplate::parse("touch ${TARGET}")
            .and_then(|t| t.render(&ctx))
            .expect("render");
        let words = shlex::split(&rendered).expect("split");
        assert_eq!(words, vec!["touch", "/b/with space/out"]);
    }

    #[test]
    fn quotes_file_stems_with_spaces() {
        let targets = vec![Utf8PathBuf::from("/b/plate with hole.inp")];
        let sources = vec![Utf8PathBuf::from("/p/my part.py")];
        let programs = IndexMap::new();
        let params = Parameters::new();
        let ctx = RenderContext {
            targets: &targets,
            sources: &sources,
            params: &params,
            programs: &programs,
            root: Utf8Path::new("/p"),
        };
        let rendered = ActionTemplate::parse("job ${TARGET.filebase} ${SOURCE.filebase}")
            .and_then(|t| t.render(&ctx))
            .expect("render");
        let words = shlex::split(&rendered).expect("split");
        assert_eq!(words, vec!["job", "plate with hole", "my part"]);
    }

    #[rstest]
    #[case("echo ${unterminated", TemplateError::Unterminated { offset: 5 })]
    #[case("echo ${}", TemplateError::InvalidName { name: String::new() })]
    #[case("echo ${TARGET.stem}", TemplateError::InvalidName { name: "TARGET.stem".into() })]
    #[case("echo ${a.b}", TemplateError::InvalidName { name: "a.b".into() })]
    fn rejects_malformed_placeholders(#[case] template: &str, #[case] expected: TemplateError) {
        assert_eq!(ActionTemplate::parse(template), Err(expected));
    }

    #[test]
    fn missing_parameter_fails_render() {
        let err = render("run ${width}", &Parameters::new()).expect_err("missing");
        assert_eq!(
            err,
            TemplateError::MissingValue {
                name: "width".into()
            }
        );
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        let err = render("echo \"open", &Parameters::new()).expect_err("invalid");
        assert!(matches!(err, TemplateError::InvalidCommand { .. }));
    }

    #[test]
    fn reports_referenced_names() {
        let template =
            ActionTemplate::parse("${program.abaqus} -job ${job} ${SOURCE} ${job}").expect("parse");
        assert_eq!(template.param_names().collect::<Vec<_>>(), vec!["job", "job"]);
        assert_eq!(template.program_names().collect::<Vec<_>>(), vec!["abaqus"]);
        assert!(template.needs_source());
    }
}
