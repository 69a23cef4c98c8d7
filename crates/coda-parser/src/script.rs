use std::collections::BTreeMap;
use std::sync::OnceLock;

use coda_core::{
    CodaError, CodaValue, DataType, ErrorKind, Instruction, ScriptParam, ScriptUnit,
};
use regex::Regex;

use crate::xml::{parse_xml_document, XmlElementNode};

pub const SCRIPT_FILE_SUFFIX: &str = ".script.xml";

fn identifier_regex() -> &'static Regex {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex must compile")
    })
}

/// Parses every `*.script.xml` entry of `sources` (keyed by relative path).
/// Other files are ignored.
pub fn parse_script_units(
    sources: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, ScriptUnit>, CodaError> {
    let mut units: BTreeMap<String, ScriptUnit> = BTreeMap::new();
    for (path, source) in sources {
        if !path.ends_with(SCRIPT_FILE_SUFFIX) {
            continue;
        }
        let unit = parse_script_unit(path, source)?;
        if let Some(previous) = units.get(&unit.name) {
            return Err(CodaError::new(
                ErrorKind::Parse,
                format!(
                    "Script \"{}\" is declared in both \"{}\" and \"{}\".",
                    unit.name, previous.source_path, path
                ),
            ));
        }
        units.insert(unit.name.clone(), unit);
    }
    Ok(units)
}

pub fn parse_script_unit(path: &str, source: &str) -> Result<ScriptUnit, CodaError> {
    let document = parse_xml_document(source)?;
    let root = &document.root;
    if root.name != "script" {
        return Err(CodaError::with_span(
            ErrorKind::Parse,
            format!("Expected <script> root element, found <{}>.", root.name),
            root.location.clone(),
        ));
    }

    let name = identifier(root, "name")?;
    let return_type = match root.attribute("return") {
        Some(raw) => raw.parse::<DataType>().map_err(|error| error.at(&root.location))?,
        None => DataType::Multi,
    };

    let mut lowering = Lowering::default();
    lowering.lower_script_body(root)?;

    Ok(ScriptUnit {
        name,
        source_path: path.to_string(),
        params: lowering.params,
        return_type,
        instructions: lowering.instructions,
    })
}

#[derive(Default)]
struct Lowering {
    params: Vec<ScriptParam>,
    instructions: Vec<Instruction>,
}

impl Lowering {
    fn lower_script_body(&mut self, root: &XmlElementNode) -> Result<(), CodaError> {
        for element in root.elements() {
            if element.name == "param" {
                if !self.instructions.is_empty() {
                    return Err(parse_error(
                        element,
                        "<param> must precede every instruction of the script.",
                    ));
                }
                self.params.push(parse_param(element)?);
                continue;
            }
            self.lower_element(element)?;
        }
        check_optional_params_trail(&self.params)
    }

    fn lower_block(&mut self, parent: &XmlElementNode) -> Result<(), CodaError> {
        for element in parent.elements() {
            if parent.name == "if" && element.name == "else" {
                continue;
            }
            self.lower_element(element)?;
        }
        Ok(())
    }

    fn lower_element(&mut self, element: &XmlElementNode) -> Result<(), CodaError> {
        match element.name.as_str() {
            "set" => {
                let target = identifier(element, "name")?;
                let expr = element.text();
                if expr.is_empty() {
                    return Err(parse_error(element, "<set> requires an expression body."));
                }
                self.instructions.push(Instruction::Assign {
                    target,
                    expr,
                    location: element.location.clone(),
                });
            }
            "command" => self.instructions.push(parse_command(element)?),
            "while" => {
                let condition = element.required_attribute("when")?.to_string();
                let start_index = self.instructions.len();
                self.instructions.push(Instruction::LoopStart {
                    condition,
                    exit_index: start_index,
                    location: element.location.clone(),
                });
                self.lower_block(element)?;
                self.instructions.push(Instruction::LoopEnd {
                    start_index,
                    location: element.location.clone(),
                });
                let exit = self.instructions.len();
                self.patch(start_index, exit);
            }
            "if" => {
                let condition = element.required_attribute("when")?.to_string();
                let branch_index = self.instructions.len();
                self.instructions.push(Instruction::Branch {
                    condition,
                    else_index: branch_index,
                    location: element.location.clone(),
                });
                self.lower_block(element)?;

                let mut else_blocks = element.elements().filter(|child| child.name == "else");
                let else_block = else_blocks.next();
                if let Some(extra) = else_blocks.next() {
                    return Err(parse_error(extra, "<if> accepts at most one <else>."));
                }

                match else_block {
                    Some(else_block) => {
                        let jump_index = self.instructions.len();
                        self.instructions.push(Instruction::Jump {
                            target: jump_index,
                            location: else_block.location.clone(),
                        });
                        let else_start = self.instructions.len();
                        self.patch(branch_index, else_start);
                        self.lower_block(else_block)?;
                        let end = self.instructions.len();
                        self.patch(jump_index, end);
                    }
                    None => {
                        let end = self.instructions.len();
                        self.patch(branch_index, end);
                    }
                }
            }
            "param" => {
                return Err(parse_error(
                    element,
                    "<param> is only allowed directly under <script>.",
                ))
            }
            "else" => return Err(parse_error(element, "<else> must be a child of <if>.")),
            other => {
                return Err(parse_error(
                    element,
                    &format!("Unsupported element <{}>.", other),
                ))
            }
        }
        Ok(())
    }

    fn patch(&mut self, index: usize, target_index: usize) {
        match &mut self.instructions[index] {
            Instruction::LoopStart { exit_index, .. } => *exit_index = target_index,
            Instruction::Branch { else_index, .. } => *else_index = target_index,
            Instruction::Jump { target, .. } => *target = target_index,
            _ => {}
        }
    }
}

fn parse_command(element: &XmlElementNode) -> Result<Instruction, CodaError> {
    let name = identifier(element, "name")?;
    let result = match element.attribute("into") {
        Some(_) => Some(identifier(element, "into")?),
        None => None,
    };
    let expect = match element.attribute("as") {
        Some(raw) => Some(
            raw.parse::<DataType>()
                .map_err(|error| error.at(&element.location))?,
        ),
        None => None,
    };

    let mut args = Vec::new();
    for child in element.elements() {
        if child.name != "arg" {
            return Err(parse_error(
                child,
                &format!("<command> only accepts <arg> children, found <{}>.", child.name),
            ));
        }
        let expr = child.text();
        if expr.is_empty() {
            return Err(parse_error(child, "<arg> requires an expression body."));
        }
        args.push(expr);
    }

    Ok(Instruction::Command {
        name,
        args,
        result,
        expect,
        location: element.location.clone(),
    })
}

fn parse_param(element: &XmlElementNode) -> Result<ScriptParam, CodaError> {
    let name = identifier(element, "name")?;
    let data_type = element
        .required_attribute("type")?
        .parse::<DataType>()
        .map_err(|error| error.at(&element.location))?;
    let default = match element.attribute("default") {
        Some(raw) => {
            Some(parse_literal(raw, data_type).map_err(|error| error.at(&element.location))?)
        }
        None => None,
    };
    Ok(ScriptParam {
        name,
        data_type,
        default,
        location: element.location.clone(),
    })
}

fn parse_literal(raw: &str, data_type: DataType) -> Result<CodaValue, CodaError> {
    let invalid = || {
        CodaError::new(
            ErrorKind::Parse,
            format!("Default \"{}\" is not a valid {} literal.", raw, data_type),
        )
    };
    match data_type {
        DataType::Numeric => raw
            .trim()
            .parse::<f64>()
            .map(CodaValue::Numeric)
            .map_err(|_| invalid()),
        DataType::String => Ok(CodaValue::String(raw.to_string())),
        DataType::Reference => {
            let trimmed = raw.trim();
            let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                Some(hex) => u32::from_str_radix(hex, 16),
                None => trimmed.parse::<u32>(),
            };
            parsed.map(CodaValue::Reference).map_err(|_| invalid())
        }
        DataType::Multi => Ok(raw
            .trim()
            .parse::<f64>()
            .map(CodaValue::Numeric)
            .unwrap_or_else(|_| CodaValue::String(raw.to_string()))),
        DataType::Invalid => Err(invalid()),
    }
}

fn check_optional_params_trail(params: &[ScriptParam]) -> Result<(), CodaError> {
    let mut seen_optional = false;
    for param in params {
        if param.default.is_some() {
            seen_optional = true;
        } else if seen_optional {
            return Err(CodaError::with_span(
                ErrorKind::Parse,
                format!(
                    "Parameter \"{}\" must declare a default because an earlier parameter is optional.",
                    param.name
                ),
                param.location.clone(),
            ));
        }
    }
    Ok(())
}

fn identifier(element: &XmlElementNode, attribute: &str) -> Result<String, CodaError> {
    let value = element.required_attribute(attribute)?;
    if !identifier_regex().is_match(value) {
        return Err(parse_error(
            element,
            &format!("Attribute \"{}\" must be an identifier, got \"{}\".", attribute, value),
        ));
    }
    Ok(value.to_string())
}

fn parse_error(element: &XmlElementNode, message: &str) -> CodaError {
    CodaError::with_span(ErrorKind::Parse, message, element.location.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ScriptUnit {
        parse_script_unit("main.script.xml", source).expect("script should parse")
    }

    #[test]
    fn commands_keep_argument_expressions_in_order() {
        let unit = parse(
            r#"
<script name="main" return="numeric">
  <command name="FormatNumber" into="text" as="string">
    <arg>value * 2</arg>
    <arg>"F2"</arg>
  </command>
  <command name="Return"><arg>45 + 12.4 * 0.1</arg></command>
</script>
"#,
        );
        assert_eq!(unit.name, "main");
        assert_eq!(unit.return_type, DataType::Numeric);
        assert_eq!(unit.instructions.len(), 2);
        let Instruction::Command {
            name,
            args,
            result,
            expect,
            ..
        } = &unit.instructions[0]
        else {
            panic!("expected command");
        };
        assert_eq!(name, "FormatNumber");
        assert_eq!(args, &vec!["value * 2".to_string(), "\"F2\"".to_string()]);
        assert_eq!(result.as_deref(), Some("text"));
        assert_eq!(*expect, Some(DataType::String));
    }

    #[test]
    fn while_lowers_to_loop_start_and_end_with_exit_index() {
        let unit = parse(
            r#"
<script name="main">
  <set name="i">0</set>
  <while when="i &lt; 3">
    <set name="i">i + 1</set>
    <command name="Continue"/>
  </while>
  <command name="Return"><arg>i</arg></command>
</script>
"#,
        );
        assert!(matches!(
            unit.instructions[1],
            Instruction::LoopStart { exit_index: 5, .. }
        ));
        assert!(matches!(
            unit.instructions[4],
            Instruction::LoopEnd { start_index: 1, .. }
        ));
        let Instruction::LoopStart { condition, .. } = &unit.instructions[1] else {
            panic!("expected loop start");
        };
        assert_eq!(condition, "i < 3");
    }

    #[test]
    fn if_else_lowers_to_branch_and_jump() {
        let unit = parse(
            r#"
<script name="main">
  <if when="flag">
    <set name="a">1</set>
    <else>
      <set name="a">2</set>
    </else>
  </if>
  <set name="b">3</set>
</script>
"#,
        );
        assert!(matches!(
            unit.instructions[0],
            Instruction::Branch { else_index: 3, .. }
        ));
        assert!(matches!(unit.instructions[2], Instruction::Jump { target: 4, .. }));
        assert_eq!(unit.instructions.len(), 5);
    }

    #[test]
    fn if_without_else_branches_past_body() {
        let unit = parse(
            r#"<script name="main"><if when="x"><command name="Break"/></if></script>"#,
        );
        assert!(matches!(
            unit.instructions[0],
            Instruction::Branch { else_index: 2, .. }
        ));
    }

    #[test]
    fn params_parse_types_and_defaults() {
        let unit = parse(
            r#"
<script name="Fn" return="reference">
  <param name="target" type="ref"/>
  <param name="label" type="string" default="none"/>
  <param name="count" type="numeric" default="2.5"/>
  <command name="Return"><arg>target</arg></command>
</script>
"#,
        );
        assert_eq!(unit.params.len(), 3);
        assert_eq!(unit.params[0].data_type, DataType::Reference);
        assert_eq!(
            unit.params[1].default,
            Some(CodaValue::String("none".to_string()))
        );
        assert_eq!(unit.params[2].default, Some(CodaValue::Numeric(2.5)));
    }

    #[test]
    fn reference_defaults_accept_hex() {
        assert_eq!(
            parse_literal("0x14", DataType::Reference).ok(),
            Some(CodaValue::Reference(20))
        );
        assert!(parse_literal("abc", DataType::Numeric).is_err());
        assert!(parse_literal("1", DataType::Invalid).is_err());
    }

    #[test]
    fn required_param_after_optional_is_rejected() {
        let error = parse_script_unit(
            "main.script.xml",
            r#"
<script name="main">
  <param name="a" type="numeric" default="1"/>
  <param name="b" type="numeric"/>
</script>
"#,
        )
        .expect_err("ordering violation");
        assert_eq!(error.kind, ErrorKind::Parse);
        assert!(error.message.contains("\"b\""));
    }

    #[test]
    fn structural_mistakes_are_parse_errors() {
        let cases = [
            r#"<function name="main"/>"#,
            r#"<script name="1bad"/>"#,
            r#"<script name="main"><loop/></script>"#,
            r#"<script name="main"><else/></script>"#,
            r#"<script name="main"><set name="a"/></script>"#,
            r#"<script name="main"><command name="PrintC"><arg/></command></script>"#,
            r#"<script name="main"><command name="PrintC"><value>1</value></command></script>"#,
            r#"<script name="main"><set name="a">1</set><param name="p" type="numeric"/></script>"#,
            r#"<script name="main"><while when="1"><param name="p" type="numeric"/></while></script>"#,
            r#"<script name="main" return="float"/>"#,
            r#"<script name="main"><if when="1"><else/><else/></if></script>"#,
        ];
        for source in cases {
            let error = parse_script_unit("main.script.xml", source).expect_err(source);
            assert_eq!(error.kind, ErrorKind::Parse, "{}", source);
        }
    }

    #[test]
    fn parse_script_units_skips_other_files_and_rejects_duplicates() {
        let mut sources = BTreeMap::new();
        sources.insert(
            "a.script.xml".to_string(),
            r#"<script name="main"/>"#.to_string(),
        );
        sources.insert("notes.txt".to_string(), "ignored".to_string());
        let units = parse_script_units(&sources).expect("parse");
        assert_eq!(units.len(), 1);
        assert!(units.contains_key("main"));

        sources.insert(
            "b.script.xml".to_string(),
            r#"<script name="main"/>"#.to_string(),
        );
        let error = parse_script_units(&sources).expect_err("duplicate script");
        assert!(error.message.contains("a.script.xml"));
    }
}
