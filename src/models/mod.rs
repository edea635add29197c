pub mod composite;
pub mod monthly;
pub mod observation;
pub mod product;
pub mod station;

pub use composite::{CompositeImage, ImageBands, PixelGrid};
pub use monthly::{MonthlyRecord, MonthlyRecordBuilder};
pub use observation::{CadenceGroup, ObservationRecord, ObservationSeries, Variable};
pub use product::{BandDescriptor, MaskRule, ProductDescriptor, ProductSet};
pub use station::Station;
