pub mod archive_items;
pub mod dump_collection;

#[derive(Debug, Clone)]
pub struct CommandReport {
    pub command: String,
    pub details: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            details: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn summary(&self) -> String {
        if self.details.is_empty() {
            return format!("{} ok", self.command);
        }
        format!("{} ok: {}", self.command, self.details.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::CommandReport;

    #[test]
    fn summary_joins_details() {
        let mut report = CommandReport::new("archive-items");
        assert_eq!(report.summary(), "archive-items ok");
        report.detail("jobs=2");
        report.detail("items=5");
        assert_eq!(report.summary(), "archive-items ok: jobs=2 items=5");
    }
}
