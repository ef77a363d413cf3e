//! Test-only helpers for building programs, flows and workspaces.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::command::{ArgumentType, Command};
use crate::core::compile::parse_instruction;
use crate::core::context::Entity;
use crate::core::instruction::{ActionSpec, PreInstruction, Program};
use crate::core::types::{Domain, RecordType, Type};
use crate::flow::default_flow;
use crate::io::config::{WizardConfig, write_config};
use crate::io::flow_store::write_flow;
use crate::io::init::WizardPaths;

/// Builder for small programs with one bare action per id.
pub struct ProgramFixture {
    actions: BTreeMap<String, ActionSpec>,
    flow: Vec<PreInstruction>,
    domain: Domain,
}

impl ProgramFixture {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            actions: ids
                .iter()
                .map(|id| (id.to_string(), ActionSpec::new(*id)))
                .collect(),
            flow: Vec::new(),
            domain: Domain::new(),
        }
    }

    fn update(mut self, id: &str, change: impl FnOnce(ActionSpec) -> ActionSpec) -> Self {
        let action = self
            .actions
            .remove(id)
            .unwrap_or_else(|| panic!("fixture has no action '{id}'"));
        self.actions.insert(id.to_string(), change(action));
        self
    }

    pub fn input(self, id: &str, input: RecordType) -> Self {
        self.update(id, |action| action.with_input(input))
    }

    pub fn output(self, id: &str, output: RecordType) -> Self {
        self.update(id, |action| action.with_output(output))
    }

    pub fn prop(self, id: &str, key: &str, value: &str) -> Self {
        self.update(id, |action| action.with_prop(key, value))
    }

    pub fn command(self, id: &str, command: Command) -> Self {
        self.update(id, |action| action.with_command(command))
    }

    pub fn domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    pub fn flow(mut self, flow: Vec<PreInstruction>) -> Self {
        self.flow = flow;
        self
    }

    pub fn build(self) -> Program {
        parse_instruction(&self.flow, self.actions, self.domain).expect("compile fixture program")
    }
}

pub fn execute(action: &str, then: Vec<PreInstruction>) -> PreInstruction {
    PreInstruction::Execute {
        action: action.to_string(),
        id: None,
        then,
    }
}

/// Execute with an explicit execute id.
pub fn execute_as(id: &str, action: &str, then: Vec<PreInstruction>) -> PreInstruction {
    PreInstruction::Execute {
        action: action.to_string(),
        id: Some(id.to_string()),
        then,
    }
}

pub fn include(include: Vec<PreInstruction>, then: Vec<PreInstruction>) -> PreInstruction {
    PreInstruction::Include { include, then }
}

pub fn repeat(repeat: Vec<PreInstruction>, then: Vec<PreInstruction>) -> PreInstruction {
    PreInstruction::Repeat { repeat, then }
}

pub fn replace(reference: &str) -> PreInstruction {
    PreInstruction::Replace {
        replace: reference.to_string(),
    }
}

pub fn entity(type_name: &str, id: &str) -> Entity {
    Entity::new(type_name, id)
}

/// `pick` chooses an `individual` through its default command; `edit`
/// requires one.
pub fn pick_edit_program() -> Program {
    ProgramFixture::new(&["pick", "edit"])
        .output(
            "pick",
            RecordType::new().with_row("individual", Type::entity("individual")),
        )
        .command(
            "pick",
            Command::assign(
                "default",
                vec![(Some("individual".to_string()), ArgumentType::Entity)],
            ),
        )
        .input(
            "edit",
            RecordType::new().with_row("individual", Type::entity("individual")),
        )
        .flow(vec![execute("pick", vec![execute("edit", Vec::new())])])
        .build()
}

/// Temporary project root with `.wizard/config.toml` and the sample flow.
pub struct TestWorkspace {
    pub dir: TempDir,
    pub paths: WizardPaths,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let paths = WizardPaths::new(dir.path());
        write_config(&paths.config_path, &WizardConfig::default()).expect("write config");
        write_flow(&paths.root.join("flow.toml"), &default_flow()).expect("write flow");
        Self { dir, paths }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn flow_path(&self) -> PathBuf {
        self.paths.root.join("flow.toml")
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
