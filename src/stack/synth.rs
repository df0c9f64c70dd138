use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use super::template::{SavedResource, SavedTemplate, TemplateParameter};
use crate::error::{Error, Result};
use crate::graph::{NodeId, ResourceGraph, StackRole};
use crate::outputs::{template_outputs, CERTIFICATE_ARN_OUTPUT};
use crate::resources::*;
use crate::variables::DeployEnv;

/// a template parameter whose value is another stack's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSource {
    pub parameter: String,
    pub stack: StackRole,
    pub output_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedStack {
    pub name: String,
    pub region: String,
    pub role: StackRole,
    pub template: SavedTemplate,
    pub parameters: Vec<ParameterSource>,
}

impl SynthesizedStack {
    /// pretty so that the template reads nicely in the cloudformation console.
    pub fn template_body(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.template)
            .map_err(|e| Error::json(format!("Failed to serialize template for {}", self.name), e))
    }

    pub fn write_to(&self, dir: &Path) -> Result<std::path::PathBuf> {
        std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, "create", e))?;
        let path = dir.join(format!("{}.template.json", self.name));
        std::fs::write(&path, self.template_body()?).map_err(|e| Error::io(&path, "write", e))?;
        Ok(path)
    }
}

pub fn validate_stack_name(stack_name: &str) -> Result<()> {
    // A stack name can contain only alphanumeric characters (case sensitive) and hyphens.
    // It must start with an alphabetical character and can't be longer than 128 characters.
    let restriction = "Must only consist of alphanumeric characters and hyphens, Must start with an alphabetical character, and cannot be longer than 128 characters.";
    let starts_alphabetic = stack_name.chars().next().map_or(false, |c| c.is_ascii_alphabetic());
    let valid_chars = stack_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !starts_alphabetic || !valid_chars || stack_name.len() > 128 {
        return Err(Error::config(format!("Invalid stack name {}\n{}", stack_name, restriction)));
    }
    Ok(())
}

pub fn stack_name_for(base: &str, role: StackRole) -> String {
    match role {
        StackRole::Main => base.to_string(),
        StackRole::Certificate => format!("{base}-certificate"),
    }
}

fn region_for(role: StackRole, env: &DeployEnv) -> String {
    match role {
        StackRole::Main => env.region.clone(),
        StackRole::Certificate => CDN_CERTIFICATE_REGION.to_string(),
    }
}

/// Split the graph into deployable stacks, in the order they must be deployed.
/// Deployment steps are not part of any template.
pub fn synthesize(graph: &ResourceGraph, stack_name: &str, env: &DeployEnv) -> Result<Vec<SynthesizedStack>> {
    graph.check_invariants()?;
    let order = graph.topological_order()?;

    let mut templates: BTreeMap<StackRole, SavedTemplate> = BTreeMap::new();
    let mut parameters: BTreeMap<StackRole, Vec<ParameterSource>> = BTreeMap::new();
    // (a, b) means stack a must be deployed before stack b.
    let mut stack_edges: Vec<(StackRole, StackRole)> = vec![];

    for id in order {
        let node = graph.node(id);
        let resource = match node.resource() {
            Some(r) => r,
            None => continue,
        };
        let mut depends_on = vec![];
        for (dep, _) in graph.dependencies_of(id) {
            let dep_node = graph.node(dep);
            if dep_node.resource().is_none() {
                continue;
            }
            if dep_node.stack == node.stack {
                depends_on.push(dep_node.logical_id.clone());
            } else {
                stack_edges.push((dep_node.stack, node.stack));
                add_cross_stack_parameter(graph, dep, node.stack, &mut parameters)?;
            }
        }
        depends_on.sort();
        let removal = resource.removal_policy().map(|p| p.deletion_policy().to_string());
        let saved = SavedResource {
            ty: resource.type_string().to_string(),
            properties: resource.properties(),
            depends_on,
            deletion_policy: removal.clone(),
            update_replace_policy: removal,
        };
        debug!(logical_id = %node.logical_id, ty = %saved.ty, stack = ?node.stack, "declared resource");
        templates.entry(node.stack).or_default().resources.insert(node.logical_id.clone(), saved);
    }

    for declared in template_outputs(graph) {
        templates.entry(declared.stack).or_default().outputs.insert(declared.key.to_string(), declared.output);
    }
    for (role, sources) in &parameters {
        let template = templates.entry(*role).or_default();
        for source in sources {
            template.parameters.insert(source.parameter.clone(), TemplateParameter {
                ty: "String".into(),
                description: format!("{} of stack {}", source.output_key, stack_name_for(stack_name, source.stack)),
            });
        }
    }

    let mut roles: Vec<StackRole> = templates.keys().copied().collect();
    // with at most two stacks a dependency check per pair is enough.
    roles.sort_by(|a, b| {
        if stack_edges.contains(&(*a, *b)) {
            std::cmp::Ordering::Less
        } else if stack_edges.contains(&(*b, *a)) {
            std::cmp::Ordering::Greater
        } else {
            a.cmp(b)
        }
    });

    let mut stacks = vec![];
    for role in roles {
        let name = stack_name_for(stack_name, role);
        validate_stack_name(&name)?;
        let mut template = templates.remove(&role).unwrap_or_default();
        template.description = format!("static website stack {name}");
        let stack = SynthesizedStack {
            region: region_for(role, env),
            parameters: parameters.remove(&role).unwrap_or_default(),
            role,
            name,
            template,
        };
        info!(stack = %stack.name, region = %stack.region, resources = stack.template.resources.len(), "synthesized stack");
        stacks.push(stack);
    }
    Ok(stacks)
}

/// only certificates are ever referenced across stacks.
fn add_cross_stack_parameter(
    graph: &ResourceGraph,
    dependency: NodeId,
    consumer: StackRole,
    parameters: &mut BTreeMap<StackRole, Vec<ParameterSource>>,
) -> Result<()> {
    let dep_node = graph.node(dependency);
    match dep_node.resource() {
        Some(Resource::Certificate(_)) => {
            let source = ParameterSource {
                parameter: CERTIFICATE_ARN_PARAMETER.to_string(),
                stack: dep_node.stack,
                output_key: CERTIFICATE_ARN_OUTPUT.to_string(),
            };
            let list = parameters.entry(consumer).or_default();
            if !list.contains(&source) {
                list.push(source);
            }
            Ok(())
        }
        _ => Err(Error::graph(format!(
            "{} is referenced from another stack, but only certificates can cross stacks",
            dep_node.logical_id
        ))),
    }
}
