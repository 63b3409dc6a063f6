pub mod coordinate;
pub mod spawn;
pub mod spiral;
