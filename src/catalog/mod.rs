use log::{debug, warn};
use thiserror::Error;

use crate::engine::models::{Catalog, VersionDescriptor};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog does not list any universes")]
    Empty,
}

/// Parse the launcher's `key = value` catalog blob into version descriptors.
///
/// A `universes = a,b,c` line declares environment names; every other line is
/// `{name}_{field} = {value}`. Unknown fields and malformed lines are skipped.
pub fn parse_catalog(text: &str) -> Result<Catalog, CatalogError> {
    let mut catalog = Catalog::default();

    for line in text.split(['\r', '\n']).filter(|l| !l.trim().is_empty()) {
        if line.starts_with("universes") {
            for name in universe_names(line) {
                declare(&mut catalog, name);
            }
            continue;
        }

        let Some((key, value)) = line.split_once(" = ") else {
            warn!("catalog: unable to process {line}");
            continue;
        };
        let Some((name, field)) = key.trim().split_once('_') else {
            warn!("catalog: unable to process {line}");
            continue;
        };
        if name.is_empty() {
            warn!("catalog: unable to process {line}");
            continue;
        }

        let value = value.trim().to_owned();
        let universe = declare(&mut catalog, name);
        match field {
            "universeServer" => universe.server = value,
            "version" => universe.version = value,
            "fileIndex" => universe.manifest_location = value,
            _ => warn!("catalog: ignoring unknown field in {line}"),
        }
    }

    if catalog.universes.is_empty() {
        return Err(CatalogError::Empty);
    }
    debug!(
        "catalog: parsed universes {:?}",
        catalog
            .universes
            .iter()
            .map(|u| u.name.as_str())
            .collect::<Vec<_>>()
    );
    Ok(catalog)
}

fn universe_names(line: &str) -> impl Iterator<Item = &str> {
    let list = line
        .split_once('=')
        .map(|(_, rest)| rest)
        .unwrap_or_default();
    list.split(',').map(str::trim).filter(|name| !name.is_empty())
}

fn declare<'a>(catalog: &'a mut Catalog, name: &str) -> &'a mut VersionDescriptor {
    let index = match catalog
        .universes
        .iter()
        .position(|u| u.name.eq_ignore_ascii_case(name))
    {
        Some(index) => index,
        None => {
            catalog.universes.push(VersionDescriptor::new(name));
            catalog.universes.len() - 1
        }
    };
    &mut catalog.universes[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "universes = Public,Test\r\n\
        Public_universeServer = public.universe.example:8000\r\n\
        Public_version = 2.5.0 - 123456 - Live\r\n\
        Public_fileIndex = http://webseed.example/FileIndex/sc-alpha-2.5.0/123456.json\r\n\
        Test_universeServer = ptu.universe.example:8000\r\n\
        Test_version = 2.6.0 - 485232 - PTU\r\n\
        Test_fileIndex = http://webseed.example/FileIndex/sc-alpha-2.6.0/485232.json\r\n";

    #[test]
    fn parses_all_universes() {
        let catalog = parse_catalog(SAMPLE).unwrap();
        assert_eq!(catalog.universes.len(), 2);

        let test = catalog.universe("test").unwrap();
        assert_eq!(test.name, "Test");
        assert_eq!(test.server, "ptu.universe.example:8000");
        assert_eq!(test.version, "2.6.0 - 485232 - PTU");
        assert_eq!(
            test.manifest_location,
            "http://webseed.example/FileIndex/sc-alpha-2.6.0/485232.json"
        );
    }

    #[test]
    fn skips_unknown_and_malformed_lines() {
        let text = "universes = Public\nPublic_motd = hello\ngarbage\nPublic_version = 1.0\n";
        let catalog = parse_catalog(text).unwrap();
        let public = catalog.universe("public").unwrap();
        assert_eq!(public.version, "1.0");
        assert!(public.server.is_empty());
    }

    #[test]
    fn keys_before_declaration_still_resolve() {
        let text = "Public_version = 1.0\nuniverses = public, Test\n";
        let catalog = parse_catalog(text).unwrap();
        let names: Vec<&str> = catalog.universes.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["Public", "Test"]);
        assert_eq!(catalog.universe("PUBLIC").unwrap().version, "1.0");
    }

    #[test]
    fn rejects_blob_without_universes() {
        assert!(matches!(parse_catalog("\r\n\n"), Err(CatalogError::Empty)));
    }
}
