pub mod deploy;
pub mod synth;
pub mod template;

pub use deploy::deploy_stacks;
pub use synth::{synthesize, ParameterSource, SynthesizedStack};
pub use template::{ResourceOutput, SavedResource, SavedTemplate, TemplateParameter};
