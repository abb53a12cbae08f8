//! Built-in skill catalogue, embedded at compile time

use serde::Deserialize;
use tracing::info;

use crate::error::{Result, SkillError};
use crate::registry::SkillRegistry;
use crate::skill::Skill;

const BUILTIN_CATALOG: &str = include_str!("../catalog/builtin.yaml");

#[derive(Debug, Deserialize)]
struct Catalog {
    skills: Vec<Skill>,
}

/// Parse a catalogue document (`skills:` list of skill definitions)
pub fn parse_catalog(yaml: &str) -> Result<Vec<Skill>> {
    let catalog: Catalog =
        serde_yaml::from_str(yaml).map_err(|e| SkillError::Catalog(e.to_string()))?;
    Ok(catalog.skills)
}

pub fn load_builtin_catalog() -> Result<Vec<Skill>> {
    parse_catalog(BUILTIN_CATALOG)
}

/// Register every built-in skill, failing on the first error
pub fn register_builtin_skills(registry: &mut SkillRegistry) -> Result<usize> {
    let skills = load_builtin_catalog()?;
    let count = skills.len();
    for skill in skills {
        registry.register(skill)?;
    }
    info!("Registered {} built-in skills", count);
    Ok(count)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::skill::render;
    use serde_json::json;

    #[test]
    fn test_builtin_catalog_parses() {
        let skills = load_builtin_catalog().unwrap();
        let ids: Vec<&str> = skills.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "open_settings",
                "open_wifi_settings",
                "capture_screen",
                "go_home",
                "bilibili_search",
                "amap_navigate",
                "wechat_scan",
            ]
        );
        for skill in &skills {
            skill.validate().unwrap();
        }
    }

    #[test]
    fn test_builtin_uri_templates_encode_arguments() {
        let skills = load_builtin_catalog().unwrap();
        let search = skills.iter().find(|s| s.id == "bilibili_search").unwrap();
        let args = search
            .parameters
            .validate(json!({"keyword": "rust lang"}))
            .unwrap();

        assert_eq!(
            render(&search.steps[0].args, &args),
            json!({"uri": "bilibili://search?keyword=rust%20lang"})
        );
    }

    #[test]
    fn test_malformed_catalog() {
        assert!(matches!(
            parse_catalog("skills: [{id: broken}]"),
            Err(SkillError::Catalog(_))
        ));
    }
}
