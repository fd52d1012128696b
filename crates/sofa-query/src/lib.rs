mod compile;
mod condition;
mod diagnostics;
mod error;
mod operator;
mod query;
mod selector;
mod sort;

pub use compile::compile;
pub use condition::{AttributeRef, Condition};
pub use diagnostics::{Diagnostics, Warning};
pub use error::QueryError;
pub use operator::{GroupOperator, Operator, tokens, translate};
pub use query::MangoQuery;
pub use selector::{Selector, flatten_and, merge_into};
pub use sort::{Sort, SortDirection};
