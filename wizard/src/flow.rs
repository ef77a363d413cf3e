//! Flow documents: the serde authoring format compiled into a [`Program`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::command::{ArgumentType, Command, Props};
use crate::core::compile::parse_instruction;
use crate::core::error::{EngineError, EngineResult};
use crate::core::instruction::{ActionSpec, ContextTypes, PreInstruction, Program};
use crate::core::types::{Domain, RecordType, StateRule, Type};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowDocument {
    #[serde(default)]
    pub actions: BTreeMap<String, ActionDecl>,
    /// Entity type -> state name -> rule.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub domain: BTreeMap<String, BTreeMap<String, StateRule>>,
    #[serde(default)]
    pub flow: Vec<PreInstruction>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: Props,
    #[serde(default)]
    pub input: RecordType,
    #[serde(default)]
    pub output: RecordType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandDecl>,
}

/// A command that assigns each argument to its key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandDecl {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<ArgumentDecl>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArgumentDecl {
    /// Context key the argument is stored under; omitted for objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "type")]
    pub ty: ArgumentType,
}

impl FlowDocument {
    pub fn compile(&self) -> EngineResult<Program> {
        let actions = self
            .actions
            .iter()
            .map(|(id, decl)| decl.to_spec(id).map(|spec| (id.clone(), spec)))
            .collect::<EngineResult<BTreeMap<_, _>>>()?;
        parse_instruction(&self.flow, actions, self.domain())
    }

    fn domain(&self) -> Domain {
        let mut domain = Domain::new();
        for (type_name, states) in &self.domain {
            for (state, rule) in states {
                domain.insert(type_name, state, rule.clone().into_expression());
            }
        }
        domain
    }
}

impl ActionDecl {
    fn to_spec(&self, id: &str) -> EngineResult<ActionSpec> {
        let mut spec = ActionSpec::new(id);
        if let Some(name) = &self.name {
            spec.name = name.clone();
        }
        spec.props = self.props.clone();
        spec.context_types = ContextTypes {
            input: self.input.clone(),
            output: self.output.clone(),
        };

        let mut seen = BTreeSet::new();
        for command in &self.commands {
            if !seen.insert(command.name.as_str()) {
                return Err(EngineError::InvalidInstruction(format!(
                    "action '{id}': duplicate command '{}'",
                    command.name
                )));
            }
            spec = spec.with_command(command.to_command(id)?);
        }
        Ok(spec)
    }
}

impl CommandDecl {
    fn to_command(&self, action: &str) -> EngineResult<Command> {
        for argument in &self.arguments {
            let keyed = argument.key.as_deref().is_some_and(|key| !key.is_empty());
            let object = argument.ty == ArgumentType::Object;
            if keyed == object {
                return Err(EngineError::InvalidInstruction(format!(
                    "action '{action}': command '{}' needs a key for every non-object argument \
                     and none for objects",
                    self.name
                )));
            }
        }
        let slots = self
            .arguments
            .iter()
            .map(|argument| (argument.key.clone(), argument.ty.clone()))
            .collect();
        Ok(Command::assign(self.name.clone(), slots))
    }
}

/// Sample flow written by `wizard init`.
///
/// `pick` chooses an individual, `edit` and `review` need one, and `review`
/// loops back to `pick` while the individual is not yet approved.
pub fn default_flow() -> FlowDocument {
    let individual = || RecordType::new().with_row("individual", Type::entity("individual"));
    let mut actions = BTreeMap::new();
    actions.insert(
        "pick".to_string(),
        ActionDecl {
            name: Some("Pick an individual".to_string()),
            output: individual(),
            commands: vec![CommandDecl {
                name: "default".to_string(),
                arguments: vec![ArgumentDecl {
                    key: Some("individual".to_string()),
                    ty: ArgumentType::Entity,
                }],
            }],
            ..ActionDecl::default()
        },
    );
    actions.insert(
        "edit".to_string(),
        ActionDecl {
            name: Some("Edit details".to_string()),
            input: individual(),
            ..ActionDecl::default()
        },
    );
    actions.insert(
        "review".to_string(),
        ActionDecl {
            name: Some("Review".to_string()),
            input: RecordType::new()
                .with_row("individual", Type::entity_in_state("individual", "approved")),
            ..ActionDecl::default()
        },
    );

    let mut individual_states = BTreeMap::new();
    individual_states.insert(
        "approved".to_string(),
        StateRule::Flag("approved".to_string()),
    );
    let mut domain = BTreeMap::new();
    domain.insert("individual".to_string(), individual_states);

    FlowDocument {
        actions,
        domain,
        flow: vec![PreInstruction::Execute {
            action: "pick".to_string(),
            id: None,
            then: vec![PreInstruction::Execute {
                action: "edit".to_string(),
                id: None,
                then: vec![
                    PreInstruction::Execute {
                        action: "review".to_string(),
                        id: None,
                        then: Vec::new(),
                    },
                    PreInstruction::Replace {
                        replace: "../../pick".to_string(),
                    },
                ],
            }],
        }],
    }
}
