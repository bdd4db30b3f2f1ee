use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    rc::Rc,
};

/// `Source` represents some literal source code.
/// Whether a repl line or a file on disk, it's essentially
/// a string with a path, the path serving as the source's
/// name. Sources without a path point to `./repl`.
#[derive(Debug, PartialEq, Eq)]
pub struct Source {
    pub contents: String,
    pub path: PathBuf,
}

impl Source {
    /// Creates a new `Source` from a string and the path it
    /// came from. `Source::path` or `Source::source` should
    /// be preferred.
    pub fn new(contents: &str, path: &Path) -> Rc<Source> {
        Rc::new(Source {
            contents: contents.to_string(),
            path: path.to_owned(),
        })
    }

    /// Builds a `Source` by reading a file from disk.
    pub fn path(path: &Path) -> std::io::Result<Rc<Source>> {
        let mut contents = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut contents)?;

        Ok(Source::new(&contents, path))
    }

    /// Builds a `Source` containing just a string.
    /// The resulting source points towards `./repl`.
    pub fn source(contents: &str) -> Rc<Source> {
        Source::new(contents, &PathBuf::from("./repl"))
    }
}
