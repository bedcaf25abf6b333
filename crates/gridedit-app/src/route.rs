// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};

/// `/editor` with an optional table segment. `/` redirects here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Route {
    table: Option<String>,
}

impl Route {
    pub const EDITOR: &'static str = "/editor";

    pub fn editor() -> Self {
        Self::default()
    }

    pub fn table(name: &str) -> Self {
        Self {
            table: Some(name.to_owned()),
        }
    }

    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim();
        if trimmed.is_empty() || trimmed == "/" {
            return Ok(Self::editor());
        }
        let Some(rest) = trimmed.strip_prefix(Self::EDITOR) else {
            bail!("unknown route {trimmed}");
        };
        match rest.trim_end_matches('/') {
            "" => Ok(Self::editor()),
            segment => match segment.strip_prefix('/') {
                Some(name) if !name.contains('/') => Ok(Self::table(name)),
                _ => bail!("unknown route {trimmed}"),
            },
        }
    }

    pub fn selected_table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn path(&self) -> String {
        match &self.table {
            Some(name) => format!("{}/{name}", Self::EDITOR),
            None => Self::EDITOR.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Route;
    use anyhow::Result;

    #[test]
    fn root_redirects_to_editor() -> Result<()> {
        assert_eq!(Route::parse("/")?, Route::editor());
        assert_eq!(Route::parse("/")?.path(), "/editor");
        Ok(())
    }

    #[test]
    fn table_segment_is_optional() -> Result<()> {
        assert_eq!(Route::parse("/editor")?.selected_table(), None);
        assert_eq!(Route::parse("/editor/")?.selected_table(), None);
        assert_eq!(Route::parse("/editor/users")?.selected_table(), Some("users"));
        assert_eq!(Route::table("users").path(), "/editor/users");
        Ok(())
    }

    #[test]
    fn other_paths_are_rejected() {
        assert!(Route::parse("/tables").is_err());
        assert!(Route::parse("/editor/users/7").is_err());
        assert!(Route::parse("/editorial").is_err());
    }
}
