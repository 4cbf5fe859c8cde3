use oso::PolarClass;

/// The platform itself, as the resource for actions that are not scoped to
/// a single ride or user record (listing, booking, administration).
#[derive(Clone, Copy, Debug, Default)]
pub struct Platform;

impl PolarClass for Platform {
    fn get_polar_class_builder() -> oso::ClassBuilder<Platform> {
        oso::Class::builder().name("Platform")
    }

    fn get_polar_class() -> oso::Class {
        let builder = Platform::get_polar_class_builder();
        builder.build()
    }
}
