pub mod call;
pub mod construct;
pub mod decls;
pub mod env;
pub mod merge;
pub mod narrow;
pub mod shape;
pub mod subst;
pub mod subtyping;
pub mod types;
pub mod typing;

pub use construct::Construction;
pub use decls::{DeclTable, TypeDecl};
pub use env::TypeEnv;
pub use shape::ShapeBuilder;
pub use subtyping::{Assumptions, Subtyping};
pub use types::{MethodType, Params, Type};
pub use typing::Typing;
