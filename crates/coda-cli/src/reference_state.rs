use coda_runtime::CommandDoc;

/// Selection and filter state of the reference browser.
#[derive(Debug, Default)]
pub(crate) struct ReferenceState {
    pub(crate) docs: Vec<CommandDoc>,
    pub(crate) filter: String,
    pub(crate) selected: usize,
}

impl ReferenceState {
    pub(crate) fn new(docs: Vec<CommandDoc>) -> Self {
        Self {
            docs,
            ..Self::default()
        }
    }

    /// Commands whose name or alias contains the filter, ignoring case.
    pub(crate) fn visible(&self) -> Vec<&CommandDoc> {
        let needle = self.filter.to_ascii_lowercase();
        self.docs
            .iter()
            .filter(|doc| {
                needle.is_empty()
                    || doc.name.to_ascii_lowercase().contains(&needle)
                    || doc
                        .alias
                        .as_ref()
                        .is_some_and(|alias| alias.to_ascii_lowercase().contains(&needle))
            })
            .collect()
    }

    pub(crate) fn current(&self) -> Option<&CommandDoc> {
        self.visible().get(self.selected).copied()
    }

    pub(crate) fn move_down(&mut self) {
        let count = self.visible().len();
        if count > 0 {
            self.selected = (self.selected + 1).min(count - 1);
        }
    }

    pub(crate) fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub(crate) fn push_filter(&mut self, ch: char) {
        self.filter.push(ch);
        self.selected = 0;
    }

    pub(crate) fn pop_filter(&mut self) {
        self.filter.pop();
        self.selected = 0;
    }

    pub(crate) fn detail_lines(&self) -> Vec<String> {
        let Some(doc) = self.current() else {
            return vec!["no matching command".to_string()];
        };
        let mut lines = vec![doc.name.clone()];
        if let Some(alias) = &doc.alias {
            lines.push(format!("alias: {}", alias));
        }
        lines.push(String::new());
        lines.push(doc.description.clone());
        lines.push(String::new());
        lines.extend(doc.usage.iter().map(|usage| format!("  {}", usage)));
        let help = strip_html(&doc.help_html);
        if !help.is_empty() {
            lines.push(String::new());
            lines.push(help);
        }
        lines
    }
}

/// Drops tags and decodes the few entities the reference uses.
pub(crate) fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                if !out.ends_with(' ') && !out.is_empty() {
                    out.push(' ');
                }
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
