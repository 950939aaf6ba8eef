pub mod form;
pub mod image;
pub mod multipart;
