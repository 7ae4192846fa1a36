//! Minimal plan-file parsing for `GET /api/plan` (spec §4.10). Full markdown
//! plan parsing is explicitly out of scope; only the checkbox-list shape the
//! dashboard needs to render progress is extracted.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanPathError {
    #[error("plan path must not be absolute")]
    Absolute,
    #[error("plan path must not contain '..' components")]
    ParentTraversal,
}

/// Reject absolute paths and any `..` component (spec §4.10).
pub fn validate_plan_path(raw: &str) -> Result<PathBuf, PlanPathError> {
    let path = Path::new(raw);
    if path.is_absolute() {
        return Err(PlanPathError::Absolute);
    }
    if path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(PlanPathError::ParentTraversal);
    }
    Ok(path.to_path_buf())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanItem {
    pub text: String,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub items: Vec<PlanItem>,
}

/// Read `plan_dir`-relative `raw_path`, falling back to
/// `<plan_dir>/completed/<file-name>` if the primary path doesn't exist.
pub fn load_plan(plan_dir: &Path, raw_path: &str) -> Result<Plan, PlanPathError> {
    let relative = validate_plan_path(raw_path)?;
    let primary = plan_dir.join(&relative);

    let contents = if primary.exists() {
        std::fs::read_to_string(&primary)
    } else {
        let base = relative.file_name().map(PathBuf::from).unwrap_or(relative);
        std::fs::read_to_string(plan_dir.join("completed").join(base))
    };

    Ok(Plan {
        items: parse_checkboxes(&contents.unwrap_or_default()),
    })
}

/// Extract `- [ ] text` / `- [x] text` lines; every other line is ignored.
fn parse_checkboxes(contents: &str) -> Vec<PlanItem> {
    let mut items = Vec::new();
    for line in contents.lines() {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix("- [") else { continue };
        let Some((mark, text)) = rest.split_once(']') else { continue };
        let checked = matches!(mark.trim(), "x" | "X");
        items.push(PlanItem {
            text: text.trim().to_string(),
            checked,
        });
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn absolute_paths_are_rejected() {
        assert_eq!(validate_plan_path("/etc/passwd"), Err(PlanPathError::Absolute));
    }

    #[test]
    fn parent_traversal_is_rejected() {
        assert_eq!(
            validate_plan_path("../../etc/passwd"),
            Err(PlanPathError::ParentTraversal)
        );
    }

    #[test]
    fn relative_path_is_accepted() {
        assert!(validate_plan_path("docs/plan.md").is_ok());
    }

    #[test]
    fn parses_checkbox_lines_and_ignores_others() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("plan.md"),
            "# Plan\n- [x] done thing\n- [ ] todo thing\nnot a checkbox\n",
        )
        .unwrap();

        let plan = load_plan(dir.path(), "plan.md").unwrap();
        assert_eq!(
            plan.items,
            vec![
                PlanItem { text: "done thing".into(), checked: true },
                PlanItem { text: "todo thing".into(), checked: false },
            ]
        );
    }

    #[test]
    fn falls_back_to_completed_subdirectory_when_primary_is_missing() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("completed")).unwrap();
        std::fs::write(dir.path().join("completed").join("plan.md"), "- [x] archived\n").unwrap();

        let plan = load_plan(dir.path(), "plan.md").unwrap();
        assert_eq!(plan.items, vec![PlanItem { text: "archived".into(), checked: true }]);
    }

    #[test]
    fn missing_plan_yields_empty_item_list() {
        let dir = tempdir().unwrap();
        let plan = load_plan(dir.path(), "nope.md").unwrap();
        assert!(plan.items.is_empty());
    }
}
