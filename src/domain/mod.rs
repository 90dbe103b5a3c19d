// Domain layer: core models and ports (interfaces). No I/O, only ndarray/serde.

pub mod constants;
pub mod model;
pub mod ports;
