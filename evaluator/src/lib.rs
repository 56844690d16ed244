pub mod bind;
mod environment;
pub mod error;
pub mod evaluator;
mod expander;
mod expression;
mod functions;
pub mod marshal;
mod reference;
pub mod registry;
pub mod resource;
pub mod validator;
pub mod value;
mod variables;

pub use bind::{Bind, Binding, Encode, FromValue, IntoValue};
pub use environment::HookScope;
pub use error::{Error, ErrorKind, Result};
pub use evaluator::{Evaluator, Variables};
pub use marshal::{Marshaler, marshal};
pub use registry::{Registry, RegistryBuilder};
pub use resource::{Attr, Resource};
pub use validator::{Commit, SchemaValidator};
pub use value::{Ref, Value};
