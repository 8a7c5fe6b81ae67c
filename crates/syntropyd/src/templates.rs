//! Named manager-config templates with `{{var}}` placeholders.

use crate::config::ManagerDefaults;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use syntropy_common::{InterfaceType, TemplateError};

pub const DEFAULT_TEMPLATE: &str = "default";

const DEFAULT: &str = "\
manager:
  home_dir: {{home_dir}}
  log_level: {{log_level}}
  api_endpoint: {{api_endpoint}}
interface:
  type: {{interface}}
environment:
  name: {{environment}}
network:
  timeout_s: 30
  retries: 3
";

const MINIMAL: &str = "\
manager:
  home_dir: {{home_dir}}
  api_endpoint: {{api_endpoint}}
interface:
  type: {{interface}}
";

const DEVELOPMENT: &str = "\
manager:
  home_dir: {{home_dir}}
  log_level: debug
  api_endpoint: {{api_endpoint}}
interface:
  type: {{interface}}
environment:
  name: {{environment}}
network:
  timeout_s: 60
  retries: 5
security:
  key_encrypted: false
";

const PRODUCTION: &str = "\
manager:
  home_dir: {{home_dir}}
  log_level: warn
  api_endpoint: {{api_endpoint}}
interface:
  type: {{interface}}
environment:
  name: {{environment}}
network:
  timeout_s: 30
  retries: 3
security:
  key_encrypted: true
  key_file_mode: \"0600\"
";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigTemplate {
    pub name: String,
    pub description: String,
    pub content: String,
}

/// Template after interpolation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedTemplate {
    pub name: String,
    pub description: String,
    pub interface: InterfaceType,
    pub environment: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct TemplateParams {
    pub interface: InterfaceType,
    pub environment: String,
    pub home_dir: String,
}

/// Replace every `{{name}}` found in `vars`; anything else is copied as is
pub fn interpolate(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

pub struct TemplateProvider {
    templates: BTreeMap<String, ConfigTemplate>,
    defaults: ManagerDefaults,
}

impl TemplateProvider {
    /// The four built-in templates
    pub fn new(defaults: ManagerDefaults) -> Self {
        let mut provider = Self {
            templates: BTreeMap::new(),
            defaults,
        };
        provider.insert("default", "Balanced settings for most nodes", DEFAULT);
        provider.insert("minimal", "Only the required manager fields", MINIMAL);
        provider.insert("development", "Verbose logging and relaxed timeouts", DEVELOPMENT);
        provider.insert("production", "Quiet logging and an encrypted owner key", PRODUCTION);
        provider
    }

    pub fn insert(&mut self, name: &str, description: &str, content: &str) {
        self.templates.insert(
            name.to_string(),
            ConfigTemplate {
                name: name.to_string(),
                description: description.to_string(),
                content: content.to_string(),
            },
        );
    }

    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ConfigTemplate> {
        self.templates.get(name)
    }

    /// Pick the template: explicit name, else one named after the
    /// environment, else `default`
    pub fn select(&self, template: Option<&str>, environment: &str) -> Result<&ConfigTemplate, TemplateError> {
        match template.map(str::trim).filter(|t| !t.is_empty()) {
            Some(name) => self
                .get(name)
                .ok_or_else(|| TemplateError::NotFound(name.to_string())),
            None => self
                .get(environment)
                .or_else(|| self.get(DEFAULT_TEMPLATE))
                .ok_or_else(|| TemplateError::NotFound(DEFAULT_TEMPLATE.to_string())),
        }
    }

    pub fn render(
        &self,
        template: Option<&str>,
        params: &TemplateParams,
    ) -> Result<RenderedTemplate, TemplateError> {
        let environment = params.environment.trim();
        if environment.is_empty() {
            return Err(TemplateError::MissingParameter("environment"));
        }
        let chosen = self.select(template, environment)?;

        let vars: HashMap<&str, String> = HashMap::from([
            ("interface", params.interface.to_string()),
            ("environment", environment.to_string()),
            ("home_dir", params.home_dir.clone()),
            ("log_level", self.defaults.log_level.clone()),
            ("api_endpoint", self.defaults.api_endpoint.clone()),
        ]);

        Ok(RenderedTemplate {
            name: chosen.name.clone(),
            description: chosen.description.clone(),
            interface: params.interface,
            environment: environment.to_string(),
            content: interpolate(&chosen.content, &vars),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(env: &str) -> TemplateParams {
        TemplateParams {
            interface: InterfaceType::Web,
            environment: env.to_string(),
            home_dir: "/home/t/.syntropy".to_string(),
        }
    }

    #[test]
    fn test_interpolate_leaves_unknown_placeholders() {
        let vars = HashMap::from([("a", "1".to_string())]);
        assert_eq!(interpolate("x={{a}} y={{ b }} z={{a", &vars), "x=1 y={{ b }} z={{a");
        assert_eq!(interpolate("{{ a }}{{a}}", &vars), "11");
        assert_eq!(interpolate("plain", &vars), "plain");
    }

    #[test]
    fn test_render_default() {
        let provider = TemplateProvider::new(ManagerDefaults::default());
        let rendered = provider.render(None, &params("staging")).unwrap();
        assert_eq!(rendered.name, "default");
        assert!(rendered.content.contains("home_dir: /home/t/.syntropy"));
        assert!(rendered.content.contains("type: web"));
        assert!(rendered.content.contains("name: staging"));
        assert!(!rendered.content.contains("{{"));
        // rendered output is YAML
        let _: serde_yaml::Value = serde_yaml::from_str(&rendered.content).unwrap();
    }

    #[test]
    fn test_environment_selects_template() {
        let provider = TemplateProvider::new(ManagerDefaults::default());
        assert_eq!(provider.render(None, &params("production")).unwrap().name, "production");
        assert_eq!(
            provider.render(Some("minimal"), &params("production")).unwrap().name,
            "minimal"
        );
    }

    #[test]
    fn test_errors() {
        let provider = TemplateProvider::new(ManagerDefaults::default());
        assert_eq!(
            provider.render(Some("nope"), &params("dev")).unwrap_err(),
            TemplateError::NotFound("nope".to_string())
        );
        assert_eq!(
            provider.render(None, &params(" ")).unwrap_err(),
            TemplateError::MissingParameter("environment")
        );
        assert_eq!(provider.names(), vec!["default", "development", "minimal", "production"]);
    }
}
