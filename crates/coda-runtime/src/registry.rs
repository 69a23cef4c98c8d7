use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use coda_core::{required_count, Arity, CodaError, DataType, ErrorKind, ParameterInfo};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::commands::register_general_commands;
use crate::dispatcher::{CommandEffect, CommandInvocation};

pub type CommandHandler =
    fn(&mut CommandInvocation<'_>) -> Result<CommandEffect, CodaError>;

fn command_name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("command name regex must compile")
    })
}

/// Static metadata and handler of one script command.
#[derive(Clone)]
pub struct CommandDescriptor {
    pub name: String,
    pub alias: Option<String>,
    pub description: String,
    pub help_html: String,
    pub arity: Arity,
    pub return_type: DataType,
    pub handler: CommandHandler,
}

impl CommandDescriptor {
    pub fn new(
        name: impl Into<String>,
        arity: Arity,
        return_type: DataType,
        handler: CommandHandler,
    ) -> Self {
        Self {
            name: name.into(),
            alias: None,
            description: String::new(),
            help_html: String::new(),
            arity,
            return_type,
            handler,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_docs(
        mut self,
        description: impl Into<String>,
        help_html: impl Into<String>,
    ) -> Self {
        self.description = description.into();
        self.help_html = help_html.into();
        self
    }

    /// One-line call shape, e.g. `FormatNumber(numeric Number, string Format, [string Locale])`.
    pub fn usage(&self) -> Vec<String> {
        let suffix = if self.return_type == DataType::Invalid {
            String::new()
        } else {
            format!(" -> {}", self.return_type)
        };
        match &self.arity {
            Arity::Simple { count } => {
                let args = (1..=*count)
                    .map(|index| format!("arg{}", index))
                    .collect::<Vec<_>>();
                vec![format!("{}({}){}", self.name, args.join(", "), suffix)]
            }
            Arity::Standard { params } => {
                vec![format!("{}({}){}", self.name, render_params(params), suffix)]
            }
            Arity::Parametric { sets } => sets
                .iter()
                .map(|set| {
                    format!(
                        "{}({}: {}){}",
                        self.name,
                        set.name,
                        render_params(&set.params),
                        suffix
                    )
                })
                .collect(),
            Arity::Variadic { leading, rest } => {
                let mut parts = Vec::new();
                if !leading.is_empty() {
                    parts.push(render_params(leading));
                }
                parts.push(format!("{}...", rest));
                vec![format!("{}({}){}", self.name, parts.join(", "), suffix)]
            }
        }
    }

    pub fn documentation(&self) -> CommandDoc {
        let parameter_sets = match &self.arity {
            Arity::Simple { .. } => Vec::new(),
            Arity::Standard { params } => vec![ParameterSetDoc {
                name: None,
                parameters: params.clone(),
                rest: None,
            }],
            Arity::Parametric { sets } => sets
                .iter()
                .map(|set| ParameterSetDoc {
                    name: Some(set.name.clone()),
                    parameters: set.params.clone(),
                    rest: None,
                })
                .collect(),
            Arity::Variadic { leading, rest } => vec![ParameterSetDoc {
                name: None,
                parameters: leading.clone(),
                rest: Some(*rest),
            }],
        };

        CommandDoc {
            name: self.name.clone(),
            alias: self.alias.clone(),
            description: self.description.clone(),
            help_html: self.help_html.clone(),
            arity: self.arity.class_name(),
            min_args: self.arity.min_args(),
            max_args: self.arity.max_args(),
            parameter_sets,
            return_type: self.return_type,
            usage: self.usage(),
        }
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("arity", &self.arity)
            .field("return_type", &self.return_type)
            .finish_non_exhaustive()
    }
}

fn render_params(params: &[ParameterInfo]) -> String {
    params
        .iter()
        .map(|param| {
            let shape = format!("{} {}", param.data_type, param.description);
            if param.is_optional() {
                format!("[{}]", shape)
            } else {
                shape
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDoc {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub description: String,
    pub help_html: String,
    pub arity: &'static str,
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub parameter_sets: Vec<ParameterSetDoc>,
    pub return_type: DataType,
    pub usage: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSetDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub parameters: Vec<ParameterInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest: Option<DataType>,
}

/// Case-insensitive command table. Names and aliases share one namespace.
#[derive(Debug, Default, Clone)]
pub struct CommandTable {
    descriptors: Vec<CommandDescriptor>,
    index: HashMap<String, usize>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-populated with the general command set.
    pub fn with_general_commands() -> Result<Self, CodaError> {
        let mut table = Self::new();
        register_general_commands(&mut table)?;
        Ok(table)
    }

    pub fn register(&mut self, descriptor: CommandDescriptor) -> Result<(), CodaError> {
        validate_descriptor(&descriptor)?;

        let mut keys = vec![descriptor.name.to_ascii_lowercase()];
        if let Some(alias) = &descriptor.alias {
            let alias_key = alias.to_ascii_lowercase();
            if alias_key == keys[0] {
                return Err(CodaError::new(
                    ErrorKind::InvalidSignature,
                    format!("Command \"{}\" repeats its name as alias.", descriptor.name),
                ));
            }
            keys.push(alias_key);
        }

        for key in &keys {
            if let Some(existing) = self.index.get(key) {
                return Err(CodaError::new(
                    ErrorKind::DuplicateCommand,
                    format!(
                        "Command identifier \"{}\" of \"{}\" is already taken by \"{}\".",
                        key, descriptor.name, self.descriptors[*existing].name
                    ),
                ));
            }
        }

        let slot = self.descriptors.len();
        for key in keys {
            self.index.insert(key, slot);
        }
        debug!(
            command = %descriptor.name,
            arity = descriptor.arity.class_name(),
            "command registered"
        );
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Resolves a name or alias, ignoring ASCII case.
    pub fn lookup(&self, name: &str) -> Option<&CommandDescriptor> {
        self.index
            .get(&name.to_ascii_lowercase())
            .map(|slot| &self.descriptors[*slot])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.descriptors.iter()
    }

    pub fn documentation(&self) -> Vec<CommandDoc> {
        self.descriptors
            .iter()
            .map(CommandDescriptor::documentation)
            .collect()
    }

    pub fn render_reference_html(&self) -> String {
        let mut out = String::from(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Command Reference</title></head>\n<body>\n",
        );
        for descriptor in &self.descriptors {
            out.push_str(&format!(
                "<h2 id=\"cmd-{}\">{}",
                escape_html(&descriptor.name),
                escape_html(&descriptor.name)
            ));
            if let Some(alias) = &descriptor.alias {
                out.push_str(&format!(" <small>({})</small>", escape_html(alias)));
            }
            out.push_str("</h2>\n");
            if !descriptor.description.is_empty() {
                out.push_str(&format!("<p>{}</p>\n", escape_html(&descriptor.description)));
            }
            for line in descriptor.usage() {
                out.push_str(&format!("<p><code>{}</code></p>\n", escape_html(&line)));
            }
            if !descriptor.help_html.is_empty() {
                out.push_str(&format!("<div class=\"help\">{}</div>\n", descriptor.help_html));
            }
        }
        out.push_str("</body>\n</html>\n");
        out
    }
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn validate_descriptor(descriptor: &CommandDescriptor) -> Result<(), CodaError> {
    let name = descriptor.name.as_str();
    if !command_name_regex().is_match(name) {
        return Err(signature_error(
            name,
            format!("\"{}\" is not a valid command name", name),
        ));
    }
    if let Some(alias) = &descriptor.alias {
        if !command_name_regex().is_match(alias) {
            return Err(signature_error(
                name,
                format!("\"{}\" is not a valid alias", alias),
            ));
        }
    }

    match &descriptor.arity {
        Arity::Simple { .. } => Ok(()),
        Arity::Standard { params } => validate_params(name, params),
        Arity::Variadic { leading, .. } => validate_params(name, leading),
        Arity::Parametric { sets } => {
            if sets.is_empty() {
                return Err(signature_error(name, "declares no parameter sets"));
            }
            let mut seen = Vec::new();
            for set in sets {
                if set.name.trim().is_empty() {
                    return Err(signature_error(name, "has an unnamed parameter set"));
                }
                if seen.contains(&set.name) {
                    return Err(signature_error(
                        name,
                        format!("declares parameter set \"{}\" twice", set.name),
                    ));
                }
                seen.push(set.name.clone());

                if set.min > set.max || set.params.len() != set.max {
                    return Err(signature_error(
                        name,
                        format!(
                            "parameter set \"{}\" declares {}..{} arguments over {} parameters",
                            set.name,
                            set.min,
                            set.max,
                            set.params.len()
                        ),
                    ));
                }
                validate_params(name, &set.params)?;
                if required_count(&set.params) != set.min {
                    return Err(signature_error(
                        name,
                        format!(
                            "parameter set \"{}\" must make exactly its first {} parameters required",
                            set.name, set.min
                        ),
                    ));
                }
            }
            Ok(())
        }
    }
}

fn validate_params(command: &str, params: &[ParameterInfo]) -> Result<(), CodaError> {
    let required = required_count(params);
    if params[required..].iter().any(|param| !param.is_optional()) {
        return Err(signature_error(
            command,
            "declares a required parameter after an optional one",
        ));
    }
    for param in params {
        if let Some(default) = &param.default {
            if !param.data_type.accepts(default) {
                return Err(signature_error(
                    command,
                    format!(
                        "parameter \"{}\" has a {} default for a {} slot",
                        param.description,
                        default.data_type(),
                        param.data_type
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn signature_error(command: &str, detail: impl fmt::Display) -> CodaError {
    CodaError::new(
        ErrorKind::InvalidSignature,
        format!("Command \"{}\" {}.", command, detail),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use coda_core::{CodaValue, ParameterSet};

    fn noop(_: &mut CommandInvocation<'_>) -> Result<CommandEffect, CodaError> {
        Ok(CommandEffect::Value(CodaValue::Invalid))
    }

    fn simple(name: &str) -> CommandDescriptor {
        CommandDescriptor::new(name, Arity::Simple { count: 0 }, DataType::Invalid, noop)
    }

    #[test]
    fn lookup_resolves_name_and_alias_to_the_same_descriptor() {
        let mut table = CommandTable::new();
        table
            .register(simple("PrintToConsole").with_alias("PrintC"))
            .expect("register");

        let by_name = table.lookup("PrintToConsole").expect("name");
        let by_alias = table.lookup("printc").expect("alias");
        assert!(std::ptr::eq(by_name, by_alias));
        assert!(table.lookup("Print").is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn registered_signatures_come_back_unchanged() {
        let parametric = Arity::Parametric {
            sets: vec![
                ParameterSet {
                    name: "ByName".to_string(),
                    min: 1,
                    max: 2,
                    params: vec![
                        ParameterInfo::required("Name", DataType::String),
                        ParameterInfo::optional("Count", DataType::Numeric, CodaValue::Numeric(1.0)),
                    ],
                },
                ParameterSet {
                    name: "ByRef".to_string(),
                    min: 0,
                    max: 1,
                    params: vec![ParameterInfo::optional(
                        "Target",
                        DataType::Reference,
                        CodaValue::NULL_REFERENCE,
                    )],
                },
            ],
        };
        let variadic = Arity::Variadic {
            leading: vec![
                ParameterInfo::required("Format", DataType::String),
                ParameterInfo::optional("Prefix", DataType::Multi, CodaValue::String(String::new())),
            ],
            rest: DataType::Multi,
        };

        let mut table = CommandTable::new();
        table
            .register(
                CommandDescriptor::new("Spawn", parametric.clone(), DataType::Reference, noop)
                    .with_alias("Spwn")
                    .with_docs("Spawns an object.", "<p>Spawn</p>"),
            )
            .expect("register parametric");
        table
            .register(
                CommandDescriptor::new("Concat", variadic.clone(), DataType::String, noop)
                    .with_alias("Cat")
                    .with_docs("Joins values.", "<p>Concat</p>"),
            )
            .expect("register variadic");

        for (key, name, alias, arity, return_type, description) in [
            ("Spawn", "Spawn", "Spwn", &parametric, DataType::Reference, "Spawns an object."),
            ("SPWN", "Spawn", "Spwn", &parametric, DataType::Reference, "Spawns an object."),
            ("concat", "Concat", "Cat", &variadic, DataType::String, "Joins values."),
            ("cat", "Concat", "Cat", &variadic, DataType::String, "Joins values."),
        ] {
            let descriptor = table.lookup(key).expect(key);
            assert_eq!(descriptor.name, name);
            assert_eq!(descriptor.alias.as_deref(), Some(alias));
            assert_eq!(&descriptor.arity, arity);
            assert_eq!(descriptor.return_type, return_type);
            assert_eq!(descriptor.description, description);
        }
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn duplicate_names_and_aliases_are_rejected() {
        let mut table = CommandTable::new();
        table.register(simple("Break")).expect("register");

        let error = table.register(simple("break")).expect_err("duplicate name");
        assert_eq!(error.kind, ErrorKind::DuplicateCommand);

        let error = table
            .register(simple("Halt").with_alias("BREAK"))
            .expect_err("alias collides");
        assert_eq!(error.kind, ErrorKind::DuplicateCommand);
        assert!(table.lookup("Halt").is_none());

        let error = table
            .register(simple("Stop").with_alias("stop"))
            .expect_err("alias repeats name");
        assert_eq!(error.kind, ErrorKind::InvalidSignature);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut table = CommandTable::new();
        let error = table.register(simple("Print To")).expect_err("space");
        assert_eq!(error.kind, ErrorKind::InvalidSignature);
        let error = table
            .register(simple("Print").with_alias("1st"))
            .expect_err("alias");
        assert_eq!(error.kind, ErrorKind::InvalidSignature);
    }

    #[test]
    fn optional_parameters_must_trail() {
        let mut table = CommandTable::new();
        let descriptor = CommandDescriptor::new(
            "Bad",
            Arity::Standard {
                params: vec![
                    ParameterInfo::optional("a", DataType::Numeric, CodaValue::Numeric(0.0)),
                    ParameterInfo::required("b", DataType::String),
                ],
            },
            DataType::Invalid,
            noop,
        );
        let error = table.register(descriptor).expect_err("ordering");
        assert_eq!(error.kind, ErrorKind::InvalidSignature);
    }

    #[test]
    fn defaults_must_match_declared_types() {
        let mut table = CommandTable::new();
        let descriptor = CommandDescriptor::new(
            "Bad",
            Arity::Standard {
                params: vec![ParameterInfo::optional(
                    "a",
                    DataType::Numeric,
                    CodaValue::String("x".to_string()),
                )],
            },
            DataType::Invalid,
            noop,
        );
        let error = table.register(descriptor).expect_err("default type");
        assert_eq!(error.kind, ErrorKind::InvalidSignature);
    }

    #[test]
    fn parametric_sets_must_be_consistent() {
        let optional = ParameterInfo::optional("m", DataType::String, CodaValue::String(String::new()));
        let bad_bounds = CommandDescriptor::new(
            "Bad",
            Arity::Parametric {
                sets: vec![ParameterSet {
                    name: "One".to_string(),
                    min: 0,
                    max: 2,
                    params: vec![optional.clone()],
                }],
            },
            DataType::Invalid,
            noop,
        );
        let mut table = CommandTable::new();
        let error = table.register(bad_bounds).expect_err("bounds");
        assert_eq!(error.kind, ErrorKind::InvalidSignature);

        let required_tail = CommandDescriptor::new(
            "Bad",
            Arity::Parametric {
                sets: vec![ParameterSet {
                    name: "One".to_string(),
                    min: 0,
                    max: 1,
                    params: vec![ParameterInfo::required("m", DataType::String)],
                }],
            },
            DataType::Invalid,
            noop,
        );
        let error = table.register(required_tail).expect_err("min vs required");
        assert_eq!(error.kind, ErrorKind::InvalidSignature);

        let empty = CommandDescriptor::new(
            "Bad",
            Arity::Parametric { sets: Vec::new() },
            DataType::Invalid,
            noop,
        );
        assert!(table.register(empty).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn general_table_documents_every_command() {
        let table = CommandTable::with_general_commands().expect("general commands");
        let docs = table.documentation();
        let names = docs.iter().map(|doc| doc.name.as_str()).collect::<Vec<_>>();
        for expected in [
            "Return",
            "Call",
            "Break",
            "Continue",
            "GetSecondsPassed",
            "FormatNumber",
            "PrintToConsole",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        assert!(docs.iter().all(|doc| !doc.description.is_empty()));

        let format = table.lookup("FmtNum").expect("alias").documentation();
        assert_eq!(format.min_args, 2);
        assert_eq!(format.max_args, Some(3));
        assert_eq!(
            format.usage,
            vec!["FormatNumber(numeric Number, string Format, [string Locale]) -> string"]
        );

        let json = serde_json::to_value(&format).expect("serialize");
        assert_eq!(json["arity"], "standard");
        assert_eq!(json["returnType"], "string");
    }

    #[test]
    fn reference_html_lists_commands_with_escaped_text() {
        let mut table = CommandTable::new();
        table
            .register(simple("Break").with_docs("Exits <loop> & continues.", "<p>raw</p>"))
            .expect("register");
        let html = table.render_reference_html();
        assert!(html.contains("<h2 id=\"cmd-Break\">Break</h2>"));
        assert!(html.contains("Exits &lt;loop&gt; &amp; continues."));
        assert!(html.contains("<div class=\"help\"><p>raw</p></div>"));
        assert!(html.contains("<code>Break()</code>"));
    }
}
