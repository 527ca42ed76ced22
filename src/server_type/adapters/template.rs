//! Server types whose command lines are rendered from `minijinja` templates.

use crate::server_type::{
    domain::{
        AttributeSchema, CommandLineDetails, LaunchMode, ServerAttributeMap, ServerTypeError,
        ServerTypeInfo,
    },
    ports::{ArtifactPaths, CommandRequest, ServerTypeDescriptor},
};
use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Launch mode definition of a [`TemplateServerType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeTemplate {
    launch_mode: LaunchMode,
    args: Vec<String>,
    required: AttributeSchema,
    optional: AttributeSchema,
}

impl ModeTemplate {
    /// Creates a mode with no extra arguments or attributes.
    #[must_use]
    pub fn new(launch_mode: LaunchMode) -> Self {
        Self {
            launch_mode,
            args: Vec::new(),
            required: AttributeSchema::new(),
            optional: AttributeSchema::new(),
        }
    }

    /// Sets argument templates appended after the server type's own.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Sets the attributes a launch in this mode requires.
    #[must_use]
    pub fn with_required(mut self, schema: AttributeSchema) -> Self {
        self.required = schema;
        self
    }

    /// Sets the attributes a launch in this mode accepts optionally.
    #[must_use]
    pub fn with_optional(mut self, schema: AttributeSchema) -> Self {
        self.optional = schema;
        self
    }

    /// Returns the launch mode.
    #[must_use]
    pub const fn launch_mode(&self) -> &LaunchMode {
        &self.launch_mode
    }
}

/// Server type defined entirely by templates.
///
/// Templates see `attrs` (attributes after defaults and overrides), `mode`,
/// `server_id` and `artifacts`. Rendering is strict: referencing an
/// undefined value fails the launch. Arguments that render to an empty
/// string are dropped, which lets optional flags disappear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateServerType {
    info: ServerTypeInfo,
    program: String,
    working_dir: String,
    args: Vec<String>,
    environment: BTreeMap<String, String>,
    server_attributes: AttributeSchema,
    modes: BTreeMap<String, ModeTemplate>,
    artifacts: BTreeMap<String, String>,
}

impl TemplateServerType {
    /// Creates a template server type with no launch modes.
    #[must_use]
    pub fn new(
        info: ServerTypeInfo,
        program: impl Into<String>,
        working_dir: impl Into<String>,
    ) -> Self {
        Self {
            info,
            program: program.into(),
            working_dir: working_dir.into(),
            args: Vec::new(),
            environment: BTreeMap::new(),
            server_attributes: AttributeSchema::new(),
            modes: BTreeMap::new(),
            artifacts: BTreeMap::new(),
        }
    }

    /// Sets argument templates shared by every mode.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Adds an environment variable template.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.environment.insert(key.into(), template.into());
        self
    }

    /// Sets the attributes required when a server of this type is created.
    #[must_use]
    pub fn with_server_attributes(mut self, schema: AttributeSchema) -> Self {
        self.server_attributes = schema;
        self
    }

    /// Adds or replaces a launch mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ModeTemplate) -> Self {
        self.modes
            .insert(mode.launch_mode().mode().to_owned(), mode);
        self
    }

    /// Adds a remote artifact provisioned before each launch.
    #[must_use]
    pub fn with_artifact(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.artifacts.insert(name.into(), url.into());
        self
    }

    fn mode(&self, mode: &str) -> Result<&ModeTemplate, ServerTypeError> {
        self.modes
            .get(mode)
            .ok_or_else(|| ServerTypeError::UnsupportedLaunchMode {
                server_type: self.info.id().to_string(),
                mode: mode.to_owned(),
            })
    }

    fn resolve_attributes(
        &self,
        mode: &ModeTemplate,
        supplied: &ServerAttributeMap,
    ) -> Result<ServerAttributeMap, ServerTypeError> {
        let mut attributes = supplied.clone();
        self.server_attributes.apply_defaults(&mut attributes);
        mode.required.apply_defaults(&mut attributes);
        mode.optional.apply_defaults(&mut attributes);

        let mut missing = self.server_attributes.missing_from(&attributes);
        missing.extend(mode.required.missing_from(&attributes));
        if missing.is_empty() {
            return Ok(attributes);
        }
        missing.sort();
        missing.dedup();
        Err(ServerTypeError::MissingAttributes {
            server_type: self.info.id().to_string(),
            attributes: missing,
        })
    }

    fn ensure_artifacts(&self, available: &ArtifactPaths) -> Result<(), ServerTypeError> {
        match self
            .artifacts
            .keys()
            .find(|name| !available.contains_key(name.as_str()))
        {
            Some(name) => Err(ServerTypeError::MissingArtifact {
                server_type: self.info.id().to_string(),
                artifact: name.clone(),
            }),
            None => Ok(()),
        }
    }

    fn render(
        &self,
        environment: &Environment<'_>,
        field: &str,
        template: &str,
        context: &Value,
    ) -> Result<String, ServerTypeError> {
        environment
            .render_str(template, context)
            .map_err(|error| ServerTypeError::TemplateRender {
                server_type: self.info.id().to_string(),
                field: field.to_owned(),
                reason: error.to_string(),
            })
    }
}

fn build_template_context(
    request: &CommandRequest<'_>,
    attributes: ServerAttributeMap,
) -> Value {
    let mut context = Map::new();
    context.insert(
        "attrs".to_owned(),
        Value::Object(attributes.into_iter().collect()),
    );
    context.insert("mode".to_owned(), Value::String(request.mode.to_owned()));
    context.insert(
        "server_id".to_owned(),
        Value::String(request.server_id.to_owned()),
    );
    context.insert(
        "artifacts".to_owned(),
        Value::Object(
            request
                .artifacts
                .iter()
                .map(|(name, path)| (name.clone(), Value::String(path.clone())))
                .collect(),
        ),
    );
    Value::Object(context)
}

impl ServerTypeDescriptor for TemplateServerType {
    fn info(&self) -> &ServerTypeInfo {
        &self.info
    }

    fn launch_modes(&self) -> Vec<LaunchMode> {
        self.modes
            .values()
            .map(|mode| mode.launch_mode.clone())
            .collect()
    }

    fn server_attributes(&self) -> AttributeSchema {
        self.server_attributes.clone()
    }

    fn required_launch_attributes(&self, mode: &str) -> Option<AttributeSchema> {
        self.modes.get(mode).map(|template| template.required.clone())
    }

    fn optional_launch_attributes(&self, mode: &str) -> Option<AttributeSchema> {
        self.modes.get(mode).map(|template| template.optional.clone())
    }

    fn artifacts(&self) -> BTreeMap<String, String> {
        self.artifacts.clone()
    }

    fn build_command(
        &self,
        request: &CommandRequest<'_>,
    ) -> Result<CommandLineDetails, ServerTypeError> {
        let mode = self.mode(request.mode)?;
        let attributes = self.resolve_attributes(mode, request.attributes)?;
        self.ensure_artifacts(request.artifacts)?;
        let context = build_template_context(request, attributes);

        let mut environment = Environment::new();
        environment.set_undefined_behavior(UndefinedBehavior::Strict);

        let mut cmd_line = vec![self.render(&environment, "program", &self.program, &context)?];
        for template in self.args.iter().chain(&mode.args) {
            let argument = self.render(&environment, "argument", template, &context)?;
            if !argument.is_empty() {
                cmd_line.push(argument);
            }
        }

        let working_dir =
            self.render(&environment, "working directory", &self.working_dir, &context)?;
        if working_dir.trim().is_empty() {
            return Err(ServerTypeError::EmptyWorkingDirectory(
                self.info.id().to_string(),
            ));
        }

        let mut envp = BTreeMap::new();
        for (key, template) in &self.environment {
            let value = self.render(&environment, key, template, &context)?;
            envp.insert(key.clone(), value);
        }

        CommandLineDetails::new(working_dir, cmd_line)
            .map(|details| details.with_environment(envp))
            .ok_or_else(|| ServerTypeError::EmptyCommandLine(self.info.id().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_type::domain::{AttributeDescriptor, AttributeKind, ServerTypeId};
    use rstest::{fixture, rstest};
    use serde_json::json;

    const HOME_DIR: &str = "server.home.dir";

    #[fixture]
    fn wildfly() -> TemplateServerType {
        let info = ServerTypeInfo::new(
            ServerTypeId::new("wildfly").expect("valid id"),
            "WildFly",
            "WildFly application server",
        );
        TemplateServerType::new(
            info,
            r#"{{ attrs["server.home.dir"] }}/bin/standalone.sh"#,
            r#"{{ attrs["server.home.dir"] }}"#,
        )
        .with_server_attributes(AttributeSchema::new().with(
            HOME_DIR,
            AttributeDescriptor::new(AttributeKind::String, "Installation directory"),
        ))
        .with_args(vec![
            "-b".to_owned(),
            r#"{{ attrs["bind.address"] }}"#.to_owned(),
            r#"{% if attrs["server.config"] %}--server-config={{ attrs["server.config"] }}{% endif %}"#
                .to_owned(),
        ])
        .with_env("JBOSS_HOME", r#"{{ attrs["server.home.dir"] }}"#)
        .with_mode(
            ModeTemplate::new(LaunchMode::run()).with_optional(
                AttributeSchema::new()
                    .with(
                        "bind.address",
                        AttributeDescriptor::new(AttributeKind::String, "Bind address")
                            .with_default(json!("127.0.0.1")),
                    )
                    .with(
                        "server.config",
                        AttributeDescriptor::new(AttributeKind::String, "Configuration file")
                            .with_default(json!("")),
                    ),
            ),
        )
        .with_mode(
            ModeTemplate::new(LaunchMode::debug())
                .with_args(vec![
                    "--debug".to_owned(),
                    r#"{{ attrs["debug.port"] }}"#.to_owned(),
                ])
                .with_required(AttributeSchema::new().with(
                    "debug.port",
                    AttributeDescriptor::new(AttributeKind::Integer, "Debugger port"),
                ))
                .with_optional(
                    AttributeSchema::new()
                        .with(
                            "bind.address",
                            AttributeDescriptor::new(AttributeKind::String, "Bind address")
                                .with_default(json!("127.0.0.1")),
                        )
                        .with(
                            "server.config",
                            AttributeDescriptor::new(AttributeKind::String, "Configuration")
                                .with_default(json!("")),
                        ),
                ),
        )
    }

    fn home(path: &str) -> ServerAttributeMap {
        ServerAttributeMap::from([(HOME_DIR.to_owned(), json!(path))])
    }

    fn request<'a>(
        mode: &'a str,
        attributes: &'a ServerAttributeMap,
        artifacts: &'a ArtifactPaths,
    ) -> CommandRequest<'a> {
        CommandRequest {
            server_id: "s1",
            mode,
            attributes,
            artifacts,
        }
    }

    #[rstest]
    fn run_mode_renders_program_and_defaults(wildfly: TemplateServerType) {
        let attributes = home("/opt/wildfly");
        let artifacts = ArtifactPaths::new();
        let details = wildfly
            .build_command(&request(LaunchMode::RUN, &attributes, &artifacts))
            .expect("command should render");

        assert_eq!(details.working_dir(), "/opt/wildfly");
        assert_eq!(
            details.cmd_line(),
            [
                "/opt/wildfly/bin/standalone.sh".to_owned(),
                "-b".to_owned(),
                "127.0.0.1".to_owned(),
            ]
        );
        assert_eq!(
            details.environment().get("JBOSS_HOME").map(String::as_str),
            Some("/opt/wildfly")
        );
    }

    #[rstest]
    fn optional_flags_appear_when_supplied(wildfly: TemplateServerType) {
        let mut attributes = home("/opt/wildfly");
        attributes.insert("server.config".to_owned(), json!("standalone-full.xml"));
        let artifacts = ArtifactPaths::new();
        let details = wildfly
            .build_command(&request(LaunchMode::RUN, &attributes, &artifacts))
            .expect("command should render");

        assert_eq!(
            details.args().last().map(String::as_str),
            Some("--server-config=standalone-full.xml")
        );
    }

    #[rstest]
    fn debug_mode_requires_its_own_attributes(wildfly: TemplateServerType) {
        let attributes = home("/opt/wildfly");
        let artifacts = ArtifactPaths::new();
        let result = wildfly.build_command(&request(LaunchMode::DEBUG, &attributes, &artifacts));

        assert_eq!(
            result,
            Err(ServerTypeError::MissingAttributes {
                server_type: "wildfly".to_owned(),
                attributes: vec!["debug.port".to_owned()],
            })
        );
    }

    #[rstest]
    fn debug_mode_appends_debug_arguments(wildfly: TemplateServerType) {
        let mut attributes = home("/opt/wildfly");
        attributes.insert("debug.port".to_owned(), json!(8787));
        let artifacts = ArtifactPaths::new();
        let details = wildfly
            .build_command(&request(LaunchMode::DEBUG, &attributes, &artifacts))
            .expect("command should render");

        assert!(details.args().ends_with(&["--debug".to_owned(), "8787".to_owned()]));
    }

    #[rstest]
    fn missing_server_home_is_reported(wildfly: TemplateServerType) {
        let attributes = ServerAttributeMap::new();
        let artifacts = ArtifactPaths::new();
        let result = wildfly.build_command(&request(LaunchMode::RUN, &attributes, &artifacts));

        assert!(matches!(
            result,
            Err(ServerTypeError::MissingAttributes { ref attributes, .. })
                if attributes == &vec![HOME_DIR.to_owned()]
        ));
    }

    #[rstest]
    fn unsupported_mode_is_rejected(wildfly: TemplateServerType) {
        let attributes = home("/opt/wildfly");
        let artifacts = ArtifactPaths::new();
        let result = wildfly.build_command(&request("profile", &attributes, &artifacts));

        assert!(matches!(
            result,
            Err(ServerTypeError::UnsupportedLaunchMode { ref mode, .. }) if mode == "profile"
        ));
        assert!(!wildfly.supports_mode("profile"));
        assert!(wildfly.required_launch_attributes("profile").is_none());
    }

    #[rstest]
    fn artifacts_must_be_provisioned(wildfly: TemplateServerType) {
        let server_type = wildfly
            .with_artifact("agent", "https://example.invalid/agent.jar")
            .with_args(vec![r#"-javaagent:{{ artifacts["agent"] }}"#.to_owned()]);
        let attributes = home("/opt/wildfly");

        let missing = server_type.build_command(&request(
            LaunchMode::RUN,
            &attributes,
            &ArtifactPaths::new(),
        ));
        assert!(matches!(
            missing,
            Err(ServerTypeError::MissingArtifact { ref artifact, .. }) if artifact == "agent"
        ));

        let artifacts =
            ArtifactPaths::from([("agent".to_owned(), "/var/cache/agent.jar".to_owned())]);
        let details = server_type
            .build_command(&request(LaunchMode::RUN, &attributes, &artifacts))
            .expect("command should render");
        assert_eq!(details.args(), ["-javaagent:/var/cache/agent.jar".to_owned()]);
    }

    #[rstest]
    fn undefined_template_values_fail_rendering(wildfly: TemplateServerType) {
        let server_type = wildfly.with_args(vec![r#"{{ attrs["no.such"] }}"#.to_owned()]);
        let attributes = home("/opt/wildfly");
        let artifacts = ArtifactPaths::new();
        let result = server_type.build_command(&request(LaunchMode::RUN, &attributes, &artifacts));

        assert!(matches!(
            result,
            Err(ServerTypeError::TemplateRender { ref field, .. }) if field == "argument"
        ));
    }

    #[rstest]
    fn lists_modes_in_tag_order(wildfly: TemplateServerType) {
        let modes = wildfly.launch_modes();
        let tags: Vec<&str> = modes.iter().map(LaunchMode::mode).collect();
        assert_eq!(tags, vec!["debug", "run"]);
    }
}
