mod tracker;

pub use tracker::GalleryTracker;
