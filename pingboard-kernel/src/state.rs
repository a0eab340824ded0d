use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Valeur remplacée en bloc : les lecteurs clonent l'`Arc`, l'écrivain échange la référence.
/// Personne ne modifie la valeur en place pendant qu'un cycle de ping la lit.
pub struct Swap<T> {
    inner: RwLock<Arc<T>>,
}

impl<T> Swap<T> {
    pub fn new(value: T) -> Self {
        Self { inner: RwLock::new(Arc::new(value)) }
    }

    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.inner.read())
    }

    pub fn store(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        *self.inner.write() = Arc::clone(&value);
        value
    }
}
