//! Column names of the result tables, as shown to Italian-speaking users.

/// Technical-location code.
pub const CODE: &str = "Sede tecnica";
/// Free-text description.
pub const DESCRIPTION: &str = "Definizione della sede tecnica";

/// Read-back classification fields, in screen order.
pub const CLASSIFICATION: [&str; 5] = ["Tipologia", "Componente", "Sezione", "Tipo ogg.", "Prof.cat."];

/// Headers applied to the bulk-read layout, in layout column order.
pub const EXTRACTED: [&str; 9] = [
    CODE,
    DESCRIPTION,
    "L",
    "L_1",
    "Tipologia",
    "Componente",
    "Sezione",
    "Tipo ogg.",
    "Prof.cat.",
];

/// Bulk-read export headers (after de-duplication) and the name each one
/// takes in [`EXTRACTED`].  A layout column blank in every row is dropped by
/// the parser and comes back empty under its target name.
pub const LAYOUT: [(&str, &str); 9] = [
    ("Sede tecnica", CODE),
    ("Definizione", DESCRIPTION),
    ("L", "L"),
    ("L_1", "L_1"),
    ("Tipologia", "Tipologia"),
    ("Componente", "Componente"),
    ("Sezione", "Sezione"),
    ("Tipo ogg.", "Tipo ogg."),
    ("Prof.cat.", "Prof.cat."),
];

/// Status indicator code after the last host action of a row.
pub const RESULT: &str = "Result";
/// Status-bar text after the last host action of a row.
pub const MESSAGE: &str = "Message";
/// `1` when any classification field changed, else `0`.
pub const CHECK: &str = "Check";
/// Human-readable list of changed fields.
pub const MODIFIED_FIELDS: &str = "Modified_Fields";

/// Name of the column holding the post-update value of `field`.
pub fn updated(field: &str) -> String {
    format!("N_{field}")
}
