//! Controller Module
//!
//! This module defines the traits at the boundary to the platform BLE stack. A
//! device session issues requests through `GattClient` and learns about their
//! completion through `GattEvent`s delivered later; requests never block.
use anyhow::Result;
use async_trait::async_trait;
use btleplug::api::{Characteristic, Service};
#[cfg(test)]
use mockall::automock;
use std::collections::BTreeSet;
use uuid::Uuid;

/// GattClient trait
///
/// Outbound requests to the BLE collaborator. Each call only enqueues work;
/// the outcome comes back as an event on the session.
#[cfg_attr(test, automock)]
pub trait GattClient: Send {
    /// Request discovery of the services whose UUID is in `filter`.
    fn discover_services(&mut self, filter: Vec<Uuid>) -> Result<()>;

    /// Request discovery of all characteristics of `service`.
    fn discover_characteristics(&mut self, service: Uuid) -> Result<()>;

    /// Request a single read of `characteristic`.
    fn read(&mut self, characteristic: Uuid) -> Result<()>;

    /// Request notifications for `characteristic`.
    fn subscribe(&mut self, characteristic: Uuid) -> Result<()>;
}

/// DisplayName trait
///
/// This trait defines the asynchronous API for retrieving the display name of an object.
#[async_trait]
pub trait DisplayName {
    /// Get the name to display for the implementing object.
    ///
    /// # Returns
    ///
    /// A `Result` containing the display name of the object as a `String` on success, or an error on failure.
    async fn get_name(&self) -> Result<String>;
}

/// GattPeripheral trait
///
/// The subset of a connected peripheral the request executor needs. Implemented
/// for every btleplug `Peripheral`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GattPeripheral: Send + Sync {
    /// Runs full service discovery and returns every service with its characteristics.
    async fn discover(&self) -> Result<BTreeSet<Service>>;

    /// Reads the current value of `characteristic`.
    async fn read_value(&self, characteristic: &Characteristic) -> Result<Vec<u8>>;

    /// Enables notifications for `characteristic`.
    async fn enable_notifications(&self, characteristic: &Characteristic) -> Result<()>;
}
