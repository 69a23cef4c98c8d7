use coda_runtime::CommandTable;

use crate::{map_cli_docs, CliError, DocsFormat};

pub(crate) fn render_docs(table: &CommandTable, format: DocsFormat) -> Result<String, CliError> {
    match format {
        DocsFormat::Json => {
            serde_json::to_string_pretty(&table.documentation()).map_err(map_cli_docs)
        }
        DocsFormat::Html => Ok(table.render_reference_html()),
    }
}
