//! Registry of configured bank clients, addressable by position, identity or
//! owned account.

use std::sync::Arc;

use tracing::debug;

use crate::{
    client::BankClient,
    error::{Error, Result},
};

#[derive(Debug, Default, Clone)]
pub struct Clients {
    clients: Vec<Arc<BankClient>>,
}

impl Clients {
    /// Fails if two credentials hash to the same identity.
    pub fn new(clients: impl IntoIterator<Item = BankClient>) -> Result<Self> {
        let mut registry = Self::default();
        for client in clients {
            registry.push(client)?;
        }
        Ok(registry)
    }

    pub fn push(&mut self, client: BankClient) -> Result<()> {
        if self.by_id(client.id()).is_some() {
            return Err(Error::DuplicateClient(client.id()));
        }
        self.clients.push(Arc::new(client));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BankClient>> {
        self.clients.iter()
    }

    /// Zero-based position in configuration order.
    pub fn get(&self, index: usize) -> Option<&Arc<BankClient>> {
        self.clients.get(index)
    }

    pub fn by_id(&self, id: u32) -> Option<&Arc<BankClient>> {
        self.clients.iter().find(|c| c.id() == id)
    }

    /// Client owning `account_id`, looked up through each client's info.
    ///
    /// Info is served from cache while the limiter denies a refresh, so this is
    /// safe to call for every incoming notification.
    pub async fn by_account(&self, account_id: &str) -> Result<Arc<BankClient>> {
        for client in &self.clients {
            match client.info().await {
                Ok(info) if info.account(account_id).is_some() => return Ok(client.clone()),
                Ok(_) => {}
                Err(err) => debug!(client_id = client.id(), %err, "skipping client"),
            }
        }
        Err(Error::NotFound(format!("client for account {account_id}")))
    }
}
