//! Test utilities & fixtures shared by the integration tests.
//! Every test gets its own temp directory; nothing here touches shared state.

use std::sync::Arc;

use runeforge::registry::{starter_pack, DefinitionStore};
use runeforge::storage::{PersistenceGateway, PoolOptions};

/// A catalog loaded with the built-in starter pack.
#[allow(dead_code)] // Not every test binary uses every helper.
pub fn starter_store() -> Arc<DefinitionStore> {
    let store = Arc::new(DefinitionStore::new());
    store.load(starter_pack()).expect("starter pack loads");
    store
}

#[allow(dead_code)]
pub fn embedded_gateway(dir: &tempfile::TempDir) -> Arc<PersistenceGateway> {
    Arc::new(PersistenceGateway::embedded(&dir.path().join("test.db")).expect("embedded gateway"))
}

#[allow(dead_code)]
pub fn pooled_gateway(dir: &tempfile::TempDir) -> Arc<PersistenceGateway> {
    Arc::new(
        PersistenceGateway::pooled(&dir.path().join("test.db"), PoolOptions::default())
            .expect("pooled gateway"),
    )
}
