//! XML interchange
//!
//! Documents have the shape
//!
//! ```xml
//! <sys-sage>
//!   <Components> ...one nested component tree... </Components>
//!   <Relations> ...one element per relation... </Relations>
//! </sys-sage>
//! ```
//!
//! Components carry an `addr` identity token that relations use to name
//! their participants. Tokens are only meaningful inside one document.

mod attrib;
mod element;
mod export;
mod import;

pub use attrib::{
    export_attributes, import_attribute, AttribComplexReader, AttribComplexWriter, AttribReader,
    AttribStringifier, ExportHooks, ImportHooks, ATTRIBUTE_ELEMENT,
};
pub use element::XmlElement;
pub use export::identity_token;

pub const ROOT_ELEMENT: &str = "sys-sage";
pub const COMPONENTS_ELEMENT: &str = "Components";
pub const RELATIONS_ELEMENT: &str = "Relations";
