mod script;
mod xml;

pub use script::{parse_script_unit, parse_script_units, SCRIPT_FILE_SUFFIX};
pub use xml::{parse_xml_document, XmlDocument, XmlElementNode, XmlNode, XmlTextNode};
