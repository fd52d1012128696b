mod adapter;
mod aggregate;
mod config;
mod error;
mod identity;
mod index;
pub mod keys;
mod model;
mod paginator;
mod repository;
mod sequence;
mod statement;
mod transcode;
mod view;

pub use adapter::{Adapter, Record};
pub use aggregate::{
    AggregateKind, AggregateOutput, AggregateRequest, AggregateStrategy, ManualScan, ViewBacked,
    ViewDescriptor, ViewPlan, ViewTarget, compute, resolve,
};
pub use config::AdapterConfig;
pub use error::{BatchFailure, DbError};
pub use identity::{generate_id, parse_id, parse_sequence_value};
pub use index::{generate_indexes, generate_view_indexes, table_index};
pub use model::{
    AttributeType, IndexSpec, KeyKind, KeyValue, Model, ModelSchema, PrimaryKey, RoleMode,
    SequenceOptions, ViewAuth, ViewKind, ViewSpec, ViewValue,
};
pub use paginator::Paginator;
pub use repository::{Repository, RevisionTable};
pub use sequence::Sequence;
pub use statement::{BuildContext, Clause, Plan, QueryOutput, Rows, Statement, build};
pub use transcode::{model_to_attributes, revert, to_document};
pub use view::{
    DesignDocument, ViewDefinition, design_doc_name, generate_views, map_function, view_name,
};

pub use sofa_query::{Condition, Diagnostics, MangoQuery, SortDirection, Warning};
