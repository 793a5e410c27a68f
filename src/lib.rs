//! Heart Rate Session
//!
//! This crate connects to a Bluetooth Low Energy (BLE) heart rate sensor, reads
//! its body sensor location once and follows its heart rate notifications. The
//! characteristic codec and the device session state machine are independent
//! of the BLE stack; the btleplug integration lives in `components::bluetooth`.

/// Core utilities and types used throughout the crate.
pub mod core {
    /// Application configuration.
    pub mod config;
    /// UUID registry and environment variable names.
    pub mod constants;
    /// Events exchanged with the BLE and display collaborators.
    pub mod events;
    /// Custom macros for code simplification.
    pub mod macros;
}

/// Traits at the boundaries of a device session.
pub mod api {
    /// Outbound BLE collaborator.
    pub mod controller;
    /// Display collaborator.
    pub mod view;
}

/// Data models representing the domain.
pub mod model {
    /// Peripheral identity and discovered characteristics.
    pub mod bluetooth;
    /// Heart Rate Service characteristic codec.
    pub mod gatt;
}

/// Components implementing the session and its collaborators.
pub mod components {
    /// btleplug integration.
    pub mod bluetooth;
    /// Display sinks.
    pub mod display;
    /// Device session state machine.
    pub mod session;
}
