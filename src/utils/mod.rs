pub mod time;

/// Generate a 21 character url-safe id.
pub fn longid() -> String {
    nanoid::nanoid!()
}

/// Generate a short id, used in scratch file names.
pub fn shortid() -> String {
    nanoid::nanoid!(10)
}
