//! Nuspec manifest reader
//!
//! Reads the metadata subset needed for identity and dependency
//! information. Element names are matched without their namespace, so all
//! published nuspec schema versions are accepted.

use crate::error::{FetchError, FetchResult};
use crate::version::{NuGetVersion, PackageIdentity};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::io::Read;
use std::str::FromStr;

/// A dependency on another package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageDependency {
    pub id: String,
    /// Version range as written in the nuspec; empty means any version
    pub version_range: String,
    pub include: Option<String>,
    pub exclude: Option<String>,
}

/// Dependencies that apply to one target framework
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyGroup {
    /// `None` for the framework-agnostic group
    pub target_framework: Option<String>,
    pub packages: Vec<PackageDependency>,
}

/// Parsed nuspec metadata
#[derive(Debug, Clone)]
pub struct NuspecReader {
    pub id: String,
    pub version: NuGetVersion,
    pub title: Option<String>,
    pub authors: Option<String>,
    pub description: Option<String>,
    pub dependency_groups: Vec<DependencyGroup>,
}

impl NuspecReader {
    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.id.clone(), self.version.clone())
    }

    /// Read and parse a nuspec stream
    pub fn from_reader<R: Read>(mut reader: R) -> FetchResult<Self> {
        let mut xml = String::new();
        reader
            .read_to_string(&mut xml)
            .map_err(|e| FetchError::InvalidNuspec(format!("unreadable nuspec: {}", e)))?;
        Self::parse(&xml)
    }

    /// Parse nuspec XML
    pub fn parse(xml: &str) -> FetchResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<String> = Vec::new();
        let mut id = None;
        let mut version = None;
        let mut title = None;
        let mut authors = None;
        let mut description = None;
        let mut groups: Vec<DependencyGroup> = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| FetchError::InvalidNuspec(format!("malformed XML: {}", e)))?;
            match event {
                Event::Start(ref e) => {
                    let name = local_name(e);
                    handle_dependency_element(&stack, &name, e, &mut groups)?;
                    stack.push(name);
                }
                Event::Empty(ref e) => {
                    let name = local_name(e);
                    handle_dependency_element(&stack, &name, e, &mut groups)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(ref t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| FetchError::InvalidNuspec(e.to_string()))?
                        .into_owned();
                    if is_metadata_child(&stack) {
                        match stack.last().map(String::as_str) {
                            Some("id") => id = Some(text),
                            Some("version") => version = Some(text),
                            Some("title") => title = Some(text),
                            Some("authors") => authors = Some(text),
                            Some("description") => description = Some(text),
                            _ => {}
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let id = id
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| FetchError::InvalidNuspec("missing <id>".to_string()))?;
        let version = version
            .ok_or_else(|| FetchError::InvalidNuspec("missing <version>".to_string()))?;
        let version = NuGetVersion::parse(&version)?;

        Ok(Self {
            id: id.trim().to_string(),
            version,
            title,
            authors,
            description,
            dependency_groups: groups,
        })
    }
}

impl FromStr for NuspecReader {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, name: &str) -> FetchResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| FetchError::InvalidNuspec(err.to_string()))?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| FetchError::InvalidNuspec(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn is_metadata_child(stack: &[String]) -> bool {
    stack.len() == 3 && stack[0] == "package" && stack[1] == "metadata"
}

fn in_dependencies(stack: &[String]) -> bool {
    stack.len() >= 3 && stack[1] == "metadata" && stack[2] == "dependencies"
}

fn handle_dependency_element(
    stack: &[String],
    name: &str,
    e: &BytesStart<'_>,
    groups: &mut Vec<DependencyGroup>,
) -> FetchResult<()> {
    if !in_dependencies(stack) {
        return Ok(());
    }

    match (name, stack.len()) {
        ("group", 3) => {
            groups.push(DependencyGroup {
                target_framework: attribute(e, "targetFramework")?.filter(|s| !s.is_empty()),
                packages: Vec::new(),
            });
        }
        ("dependency", 3) | ("dependency", 4) => {
            let Some(dep_id) = attribute(e, "id")? else {
                return Err(FetchError::InvalidNuspec("dependency without id".to_string()));
            };
            let dependency = PackageDependency {
                id: dep_id,
                version_range: attribute(e, "version")?.unwrap_or_default(),
                include: attribute(e, "include")?,
                exclude: attribute(e, "exclude")?,
            };

            if stack.len() == 4 {
                if let Some(group) = groups.last_mut() {
                    group.packages.push(dependency);
                }
            } else {
                // legacy flat list: collect into the framework-agnostic group
                match groups.iter_mut().find(|g| g.target_framework.is_none()) {
                    Some(group) => group.packages.push(dependency),
                    None => groups.push(DependencyGroup {
                        target_framework: None,
                        packages: vec![dependency],
                    }),
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::nuspec_xml;

    #[test]
    fn reads_identity_and_groups() {
        let reader = NuspecReader::parse(&nuspec_xml("Contoso.Lib", "2.1.0-beta")).unwrap();
        assert_eq!(reader.id, "Contoso.Lib");
        assert_eq!(reader.version.to_normalized_string(), "2.1.0-beta");
        assert_eq!(reader.authors.as_deref(), Some("Test Author"));
        assert_eq!(reader.dependency_groups.len(), 1);

        let group = &reader.dependency_groups[0];
        assert_eq!(group.target_framework.as_deref(), Some("net8.0"));
        assert_eq!(group.packages[0].id, "Dep.One");
        assert_eq!(group.packages[0].version_range, "[1.0.0, )");
        assert_eq!(group.packages[0].exclude.as_deref(), Some("Build"));
    }

    #[test]
    fn legacy_flat_dependencies() {
        let xml = r#"<?xml version="1.0"?>
<package>
  <metadata>
    <id>Old</id>
    <version>1.0</version>
    <dependencies>
      <dependency id="A" version="1.0" />
      <dependency id="B" />
    </dependencies>
  </metadata>
</package>"#;
        let reader = NuspecReader::parse(xml).unwrap();
        assert_eq!(reader.dependency_groups.len(), 1);
        let group = &reader.dependency_groups[0];
        assert!(group.target_framework.is_none());
        let ids: Vec<&str> = group.packages.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(group.packages[1].version_range, "");
    }

    #[test]
    fn from_reader_matches_parse() {
        let xml = nuspec_xml("Reader.Test", "1.0.0.0");
        let reader = NuspecReader::from_reader(xml.as_bytes()).unwrap();
        let parsed: NuspecReader = xml.parse().unwrap();
        assert_eq!(reader.identity(), parsed.identity());
        assert_eq!(reader.version.original(), "1.0.0.0");
    }

    #[test]
    fn missing_id_is_an_error() {
        let xml = "<package><metadata><version>1.0.0</version></metadata></package>";
        assert!(matches!(
            NuspecReader::parse(xml),
            Err(FetchError::InvalidNuspec(_))
        ));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(NuspecReader::parse("<package><metadata><id>x</id>").is_err());
    }
}
