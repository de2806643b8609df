pub mod detector;
pub mod device;
pub mod gaussian;
pub mod labels;
pub mod params;
pub mod predictor;
pub mod rolling;
pub mod sequence;
