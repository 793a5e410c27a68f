use btleplug::api::bleuuid::uuid_from_u16;
use uuid::Uuid;

/// UUID for the Heart Rate Service.
pub const HEARTRATE_SERVICE_UUID: Uuid = uuid_from_u16(0x180D);
/// UUID for the Heart Rate Measurement Characteristic.
pub const HEARTRATE_MEASUREMENT_UUID: Uuid = uuid_from_u16(0x2A37);
/// UUID for the Body Sensor Location Characteristic.
pub const BODY_SENSOR_LOCATION_UUID: Uuid = uuid_from_u16(0x2A38);

pub const LOG_LEVEL_ENV: &str = "HRM_LOG_LEVEL";
pub const LOG_STYLE_ENV: &str = "HRM_LOG_STYLE";
pub const CONFIG_PATH_ENV: &str = "HRM_CONFIG";
