//! The fixed set of bibliographic categories published as MARC exports.
//!
//! Category ids are the join key into the metadata store, so they must stay
//! stable across releases.

use url::Url;

/// Suffix appended to every category id to form the remote file name.
pub const MRC_FILE_SUFFIX: &str = "-mrc_new.mrc";

/// Default location of the published exports.
pub const DEFAULT_BASE_URL: &str =
    "https://www.bne.es/redBNE/alma/SuministroRegistros/Bibliograficos/";

/// A class of bibliographic material with its own downloadable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Category {
    /// Stable identifier, also used as the per-category directory name.
    pub id: &'static str,
    /// Human-readable description.
    pub description: &'static str,
}

/// Every category known to the harvester.
pub const CATEGORIES: &[Category] = &[
    Category {
        id: "GRAFNOPRO",
        description: "Drawings, posters, ephemera, prints, photographs",
    },
    Category {
        id: "GRAFPRO",
        description: "Filmstrips, transparencies",
    },
    Category {
        id: "GRABSONORA",
        description: "Sound recordings",
    },
    Category {
        id: "KIT",
        description: "Kits and multimedia",
    },
    Category {
        id: "MANUSCRITO",
        description: "Manuscripts and personal archives",
    },
    Category {
        id: "CARTOGRAFI",
        description: "Maps",
    },
    Category {
        id: "MATEMIXTO",
        description: "Mixed materials",
    },
    Category {
        id: "MONOANTIGU",
        description: "Early monographs",
    },
    Category {
        id: "MONOMODERN",
        description: "Modern monographs",
    },
    Category {
        id: "MUSICAESC",
        description: "Printed music",
    },
    Category {
        id: "RECELECTRO",
        description: "Electronic resources",
    },
    Category {
        id: "SERIADA",
        description: "Newspapers and journals",
    },
    Category {
        id: "VIDEO",
        description: "Video recordings",
    },
];

/// Looks up a category by its identifier.
#[must_use]
pub fn find_category(id: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|category| category.id == id)
}

impl Category {
    /// Builds the remote URL for this category.
    ///
    /// This is a plain concatenation, so `base_url` is expected to carry its
    /// own trailing separator.
    #[must_use]
    pub fn url(&self, base_url: &str) -> String {
        format!("{base_url}{}{MRC_FILE_SUFFIX}", self.id)
    }
}

/// Local file name for a category file published at `url`.
///
/// Uses the last non-empty path segment of `url`, falling back to
/// `<category_id>-mrc_new.mrc` when the URL has none.
#[must_use]
pub fn local_file_name(category_id: &str, url: &str) -> String {
    file_name_from_url(url).unwrap_or_else(|| format!("{category_id}{MRC_FILE_SUFFIX}"))
}

fn file_name_from_url(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
}
