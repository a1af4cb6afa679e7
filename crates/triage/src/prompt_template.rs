use include_dir::{include_dir, Dir};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tera::{Context, Error as TeraError, Tera};

static PROMPTS: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/prompts");

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

/// Render a template file. The prompts compiled into the crate win, other
/// names are read from disk.
pub fn load_prompt_file<T: Serialize>(
    template_file: impl Into<PathBuf>,
    context_data: &T,
) -> Result<String, TeraError> {
    let template_path = template_file.into();
    let template_content = match PROMPTS
        .get_file(&template_path)
        .and_then(|file| file.contents_utf8())
    {
        Some(embedded) => embedded.to_string(),
        None => fs::read_to_string(&template_path).map_err(|e| {
            TeraError::chain(
                format!("Failed to read template file {}", template_path.display()),
                e,
            )
        })?,
    };
    load_prompt(&template_content, context_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::Tool;
    use serde_json::json;
    use serial_test::serial;
    use std::collections::HashMap;

    #[test]
    fn test_load_prompt() {
        let template = "Route {{ request }} to {{ model }}.";
        let mut context = HashMap::new();
        context.insert("request".to_string(), "2+2".to_string());
        context.insert("model".to_string(), "fast-small".to_string());

        let result = load_prompt(template, &context).unwrap();
        assert_eq!(result, "Route 2+2 to fast-small.");
    }

    #[test]
    fn test_load_prompt_missing_variable() {
        let template = "Route {{ request }} to {{ model }}.";
        let mut context = HashMap::new();
        context.insert("request".to_string(), "2+2".to_string());
        assert!(load_prompt(template, &context).is_err());
    }

    #[test]
    fn test_load_prompt_file_from_disk() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("custom.md");
        fs::write(&file_path, "Hello, {{ name }}!").unwrap();

        let mut context = HashMap::new();
        context.insert("name".to_string(), "Bob".to_string());
        assert_eq!(load_prompt_file(file_path, &context).unwrap(), "Hello, Bob!");
    }

    #[test]
    fn test_load_embedded_prompt() {
        let context = json!({
            "models": "[]",
            "tools": ["web_search", "vocr"],
            "latest_turn": "{}"
        });
        let rendered = load_prompt_file("planner.md", &context).unwrap();
        assert!(rendered.contains("web_search, vocr"));
    }

    #[test]
    #[serial]
    fn test_embedded_prompt_ignores_working_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("planner.md"), "stray {{ tools }}").unwrap();
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp_dir.path()).unwrap();

        let context = json!({"models": "[]", "tools": ["vocr"], "latest_turn": "{}"});
        let rendered = load_prompt_file("planner.md", &context);
        std::env::set_current_dir(original).unwrap();

        let rendered = rendered.unwrap();
        assert!(!rendered.starts_with("stray"));
        assert!(rendered.contains("## Latest user turn"));
    }

    #[test]
    fn test_unknown_prompt_file() {
        let context: HashMap<String, String> = HashMap::new();
        assert!(load_prompt_file("non_existent_template.md", &context).is_err());
    }

    #[test]
    fn test_tools_prompt_lists_attachments() {
        let context = json!({
            "files": [{"uri": "attachment://files/0", "mime_type": "image/png"}],
            "now": "2024-01-01T00:00:00Z"
        });
        let rendered = load_prompt_file("tools.md", &context).unwrap();
        assert!(rendered.contains("- attachment://files/0 (image/png)"));

        let empty = json!({"files": [], "now": "2024-01-01T00:00:00Z"});
        assert!(!load_prompt_file("tools.md", &empty)
            .unwrap()
            .contains("attachment://"));
    }

    #[test]
    fn test_load_prompt_with_tools() {
        let template = "{% for tool in tools %}{{tool.name}}: {{tool.description}}\n{% endfor %}";
        let tools = vec![Tool::new(
            "vocr",
            "Read text from an image",
            json!({"type": "object"}),
        )];
        let mut context = HashMap::new();
        context.insert("tools".to_string(), tools);
        assert_eq!(
            load_prompt(template, &context).unwrap(),
            "vocr: Read text from an image\n"
        );
    }
}
