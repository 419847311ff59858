//! Widget capability trait, registry, concurrent executor, and the seven
//! reference widget implementations.

pub mod builtins;
pub mod executor;
pub mod registry;

pub use builtins::{CalculatorWidget, HotelWidget, MovieWidget, PlaceWidget, ProductWidget, StockWidget, WeatherWidget};
pub use executor::{execute_all, WidgetExecutorConfig};
pub use registry::{Widget, WidgetContext, WidgetRegistry};

/// Registers all seven reference widgets, matching `agenticlaw-tools`'s
/// `create_default_registry` convention of one function that wires the
/// full built-in set.
pub fn default_registry() -> WidgetRegistry {
    let mut registry = WidgetRegistry::new();
    registry.register(WeatherWidget);
    registry.register(StockWidget);
    registry.register(CalculatorWidget);
    registry.register(ProductWidget);
    registry.register(HotelWidget);
    registry.register(PlaceWidget);
    registry.register(MovieWidget);
    registry
}
