//! Parses the `kernel.xml` metadata embedded in a bitstream archive into the
//! argument descriptor list `Instance::GetArgsInfo` returns in the original
//! driver.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use graph_abi::{ArgCat, ArgInfo};

/// Reads the zip archive at `xo_path`, finds the member ending in
/// `kernel.xml`, and parses its `root/kernel/args/arg` elements.
pub fn parse_args_info(xo_path: impl AsRef<Path>) -> Result<Vec<ArgInfo>> {
    let xo_path = xo_path.as_ref();
    let file = File::open(xo_path)
        .with_context(|| format!("failed to open bitstream archive '{}'", xo_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("'{}' is not a valid zip archive", xo_path.display()))?;

    let member_name = (0..archive.len())
        .map(|i| archive.by_index(i).map(|f| f.name().to_string()))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .find(|name| name.ends_with("kernel.xml"))
        .with_context(|| format!("missing 'kernel.xml' in '{}'", xo_path.display()))?;

    let mut kernel_xml = String::new();
    {
        use std::io::Read;
        archive
            .by_name(&member_name)
            .context("kernel.xml member vanished between listing and read")?
            .read_to_string(&mut kernel_xml)?;
    }

    parse_kernel_xml(&kernel_xml)
}

fn parse_kernel_xml(xml: &str) -> Result<Vec<ArgInfo>> {
    let doc = roxmltree::Document::parse(xml).context("failed to parse kernel.xml")?;

    let mut args = Vec::new();
    for arg in doc
        .descendants()
        .filter(|n| n.has_tag_name("kernel"))
        .flat_map(|kernel| kernel.children())
        .filter(|n| n.has_tag_name("args"))
        .flat_map(|args| args.children())
        .filter(|n| n.has_tag_name("arg"))
    {
        let index: u32 = attr(arg, "id")?.parse().context("non-numeric arg id")?;
        let name = attr(arg, "name")?.to_string();
        let ty = attr(arg, "type")?.to_string();
        let address_qualifier: u32 = attr(arg, "addressQualifier")?
            .parse()
            .context("non-numeric addressQualifier")?;
        let cat = match address_qualifier {
            0 => ArgCat::Scalar,
            1 => ArgCat::Mmap,
            4 => ArgCat::Stream,
            other => {
                eprintln!("warning: unknown addressQualifier {other} for arg '{name}'; skipping");
                continue;
            }
        };
        args.push(ArgInfo {
            index,
            name,
            ty,
            cat,
        });
    }

    args.sort_by_key(|a| a.index);
    Ok(args)
}

fn attr<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Result<&'a str> {
    node.attribute(name)
        .with_context(|| format!("arg element missing '{name}' attribute"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_sorts_args_by_index() {
        let xml = r#"
            <root>
              <kernel>
                <args>
                  <arg id="1" name="a" type="int*" addressQualifier="1"/>
                  <arg id="0" name="n" type="int" addressQualifier="0"/>
                  <arg id="2" name="s" type="int" addressQualifier="4"/>
                </args>
              </kernel>
            </root>
        "#;
        let args = parse_kernel_xml(xml).unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(args[0].index, 0);
        assert_eq!(args[0].cat, ArgCat::Scalar);
        assert_eq!(args[1].index, 1);
        assert_eq!(args[1].cat, ArgCat::Mmap);
        assert_eq!(args[2].index, 2);
        assert_eq!(args[2].cat, ArgCat::Stream);
    }

    #[test]
    fn skips_unknown_address_qualifier_and_keeps_parsing() {
        let xml = r#"
            <root><kernel><args>
              <arg id="0" name="x" type="int" addressQualifier="9"/>
              <arg id="1" name="y" type="int" addressQualifier="0"/>
            </args></kernel></root>
        "#;
        let args = parse_kernel_xml(xml).unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].name, "y");
        assert_eq!(args[0].cat, ArgCat::Scalar);
    }
}
