use crate::database_ddl::DdlStatement;
use crate::database_model::TableSnapshot;
use crate::error::Result;

/// The two primitives the schema engine needs from a database.
///
/// Implementations report a rejected statement as `SchemaMutationFailed`
/// and connection or I/O problems as `BackendUnavailable`.
/// Pooling and connection management belong to the implementation.
pub trait RelationalBackend {
    fn execute_ddl(&self, statement: &DdlStatement) -> Result<()>;

    /// Current tables with their columns, ordered by table name.
    fn introspect(&self) -> Result<Vec<TableSnapshot>>;
}
