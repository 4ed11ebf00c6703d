pub mod services;

pub use services::{read_image_field, validate_image, ImageUpload};
