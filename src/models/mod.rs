mod visit;

pub use visit::{DeviceType, NewVisit, ParseDeviceTypeError, VisitEvent};
