use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::Instrument;
use turnstile_model::ModelTool;

use super::{
    Error, NAMESPACE_SEPARATOR, READ_SKILL_TOOL, SkillSource, ToolProvider,
    ToolResult,
};

/// Splits a namespaced tool name into the provider and local names.
///
/// Only the first separator counts, so local names may contain it.
pub fn split_tool_name(tool_name: &str) -> Result<(&str, &str), Error> {
    match tool_name.split_once(NAMESPACE_SEPARATOR) {
        Some((provider, local))
            if !provider.is_empty() && !local.is_empty() =>
        {
            Ok((provider, local))
        }
        _ => Err(Error::unknown_tool_format()
            .with_reason(format!("cannot resolve tool name: {tool_name}"))),
    }
}

/// The target of a tool call.
pub enum Resolved<'a> {
    /// The skill-reading tool.
    Skill(&'a dyn SkillSource),
    /// A tool of a connected provider.
    Provider {
        /// The provider owning the tool.
        provider: &'a dyn ToolProvider,
        /// The tool name without the provider prefix.
        local_name: &'a str,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadSkillInput {
    skill_name: String,
}

/// Maps namespaced tool names to the providers that own them.
///
/// The registry is built once by [`Registry::connect`] and is read-only
/// afterwards, apart from [`Registry::disconnect_all`].
pub struct Registry {
    providers: Vec<Box<dyn ToolProvider>>,
    unavailable: Vec<String>,
    skills: Option<Arc<dyn SkillSource>>,
    definitions: Vec<ModelTool>,
    connected: bool,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            providers: vec![],
            unavailable: vec![],
            skills: None,
            definitions: vec![],
            connected: true,
        }
    }
}

impl Registry {
    /// Connects every provider and collects the tool definitions.
    ///
    /// A provider that fails to connect or to list its tools is recorded
    /// as unavailable and left out, the others are still registered.
    pub async fn connect(
        providers: Vec<Box<dyn ToolProvider>>,
        skills: Option<Arc<dyn SkillSource>>,
    ) -> Self {
        let mut registry = Registry {
            skills,
            ..Default::default()
        };

        for mut provider in providers {
            let name = provider.name().to_owned();
            if name.is_empty() || name.contains(NAMESPACE_SEPARATOR) {
                warn!("invalid tool provider name: {name:?}");
                registry.unavailable.push(name);
                continue;
            }
            if registry.provider(&name).is_some() {
                warn!("duplicated tool provider: {name}");
                registry.unavailable.push(name);
                continue;
            }

            if let Err(err) = provider
                .connect()
                .instrument(debug_span!("provider connect", provider = %name))
                .await
            {
                warn!("failed to connect tool provider {name}: {err}");
                registry.unavailable.push(name);
                continue;
            }
            let tools = match provider.list_tools().await {
                Ok(tools) => tools,
                Err(err) => {
                    warn!("failed to list tools of provider {name}: {err}");
                    if let Err(err) = provider.disconnect().await {
                        warn!("failed to disconnect provider {name}: {err}");
                    }
                    registry.unavailable.push(name);
                    continue;
                }
            };

            info!("tool provider {name} connected with {} tools", tools.len());
            registry.definitions.extend(tools.into_iter().map(|tool| {
                ModelTool {
                    name: format!("{name}{NAMESPACE_SEPARATOR}{}", tool.name),
                    ..tool
                }
            }));
            registry.providers.push(provider);
        }

        if let Some(definition) =
            registry.skills.as_ref().and_then(|s| s.tool_definition())
        {
            registry.definitions.push(definition);
        }
        registry
    }

    /// Returns the definitions of all registered tools.
    #[inline]
    pub fn definitions(&self) -> &[ModelTool] {
        &self.definitions
    }

    /// Returns the names of the connected providers.
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.name())
    }

    /// Returns the names of the providers that could not be registered.
    #[inline]
    pub fn unavailable_providers(&self) -> &[String] {
        &self.unavailable
    }

    /// Returns the skill collaborator, if any.
    #[inline]
    pub fn skills(&self) -> Option<&Arc<dyn SkillSource>> {
        self.skills.as_ref()
    }

    fn provider(&self, name: &str) -> Option<&dyn ToolProvider> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    /// Resolves a tool name to its target.
    pub fn resolve<'a>(
        &'a self,
        tool_name: &'a str,
    ) -> Result<Resolved<'a>, Error> {
        if tool_name == READ_SKILL_TOOL {
            if let Some(skills) = &self.skills {
                return Ok(Resolved::Skill(skills.as_ref()));
            }
        }
        let (provider_name, local_name) = split_tool_name(tool_name)?;
        let Some(provider) = self.provider(provider_name) else {
            return Err(Error::unknown_provider()
                .with_reason(format!("no such provider: {provider_name}")));
        };
        Ok(Resolved::Provider {
            provider,
            local_name,
        })
    }

    /// Resolves and invokes a tool.
    ///
    /// Errors are returned as is, there are no retries.
    pub async fn invoke(
        &self,
        tool_name: &str,
        arguments: Value,
    ) -> ToolResult {
        match self.resolve(tool_name)? {
            Resolved::Skill(skills) => {
                let input: ReadSkillInput =
                    serde_json::from_value(arguments).map_err(|err| {
                        Error::invalid_input().with_reason(format!("{err}"))
                    })?;
                let content = skills.read(&input.skill_name).await?;
                Ok(json!({
                    "skillName": input.skill_name,
                    "content": content,
                }))
            }
            Resolved::Provider {
                provider,
                local_name,
            } => {
                provider
                    .invoke(local_name, arguments)
                    .instrument(debug_span!(
                        "tool dispatch",
                        provider = provider.name(),
                        tool = local_name
                    ))
                    .await
            }
        }
    }

    /// Disconnects every provider. Calling it more than once is a no-op.
    pub async fn disconnect_all(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        for provider in &mut self.providers {
            if let Err(err) = provider.disconnect().await {
                let name = provider.name();
                warn!("failed to disconnect provider {name}: {err}");
            }
        }
    }
}
