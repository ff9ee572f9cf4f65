use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::utils::parser::DatasetParser;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// 绝对路径、`..`、盘符等任何会离开资源目录的写法
    #[error("文件路径不合法: {0}")]
    UnsafePath(String),
    #[error("不支持的文件格式: {file}")]
    Unsupported { file: String, supported: Vec<String> },
}

/// 在资源目录中定位到的数据集文件
pub struct ResolvedFile<'a> {
    pub path: PathBuf,
    pub parser: &'a dyn DatasetParser,
    /// 命中的扩展名 (小写，可能是 `json.gz` 这样的复合扩展名)
    pub extension: String,
}

impl ResolvedFile<'_> {
    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// 数据集读取器注册表
///
/// 扩展名按后缀匹配，较长的复合扩展名优先，
/// 因此 `snap.json.gz` 交给 gzip 读取器而不是 JSON 读取器。
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DatasetParser>>,
    /// (小写扩展名, 读取器下标)，按扩展名长度降序
    suffixes: Vec<(String, usize)>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::with_parsers(crate::parsers::get_all_parsers())
    }

    pub fn with_parsers(parsers: Vec<Box<dyn DatasetParser>>) -> Self {
        let mut suffixes: Vec<(String, usize)> = parsers
            .iter()
            .enumerate()
            .flat_map(|(k, p)| {
                p.supported_extensions()
                    .into_iter()
                    .map(move |ext| (ext.to_lowercase(), k))
            })
            .collect();
        suffixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        suffixes.dedup_by(|a, b| a.0 == b.0);
        Self { parsers, suffixes }
    }

    /// 按文件名后缀查找读取器，返回命中的扩展名
    pub fn find_parser_for_file(&self, file_path: &str) -> Option<(&dyn DatasetParser, String)> {
        let name = Path::new(file_path).file_name()?.to_str()?.to_lowercase();
        self.suffixes.iter().find_map(|(ext, k)| {
            let stem = name.strip_suffix(ext.as_str())?.strip_suffix('.')?;
            (!stem.is_empty()).then(|| (self.parsers[*k].as_ref(), ext.clone()))
        })
    }

    /// 把请求里的相对文件名解析到 `resource_dir` 下
    ///
    /// 只接受由普通路径段组成的相对路径。
    pub fn resolve_in(&self, resource_dir: &str, file: &str) -> Result<ResolvedFile<'_>, RegistryError> {
        let relative = Path::new(file);
        let confined = !file.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !confined {
            return Err(RegistryError::UnsafePath(file.to_string()));
        }
        let (parser, extension) =
            self.find_parser_for_file(file)
                .ok_or_else(|| RegistryError::Unsupported {
                    file: file.to_string(),
                    supported: self.supported_extensions(),
                })?;
        Ok(ResolvedFile {
            path: Path::new(resource_dir).join(relative),
            parser,
            extension,
        })
    }

    /// 所有支持的扩展名，字典序
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.suffixes.iter().map(|(ext, _)| ext.clone()).collect();
        extensions.sort();
        extensions
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_extension_wins_over_plain_suffix() {
        let registry = ParserRegistry::new();
        assert_eq!(registry.supported_extensions(), vec!["json", "json.gz"]);
        let (parser, ext) = registry.find_parser_for_file("run/output_00042.json").unwrap();
        assert_eq!((parser.name(), ext.as_str()), ("JSON Parser", "json"));
        let (parser, ext) = registry.find_parser_for_file("snap.JSON.GZ").unwrap();
        assert_eq!((parser.name(), ext.as_str()), ("Gzip JSON Parser", "json.gz"));
        assert!(registry.find_parser_for_file("archive.tar.gz").is_none());
        assert!(registry.find_parser_for_file(".json").is_none());
        assert!(registry.find_parser_for_file("no_extension").is_none());
    }

    #[test]
    fn resolves_only_inside_resource_dir() {
        let registry = ParserRegistry::new();
        let resolved = registry.resolve_in("data", "runs/snap.json.gz").unwrap();
        assert_eq!(resolved.path, Path::new("data").join("runs").join("snap.json.gz"));
        assert_eq!(resolved.extension, "json.gz");

        for bad in ["../../etc/x.json", "/etc/x.json", "runs/../../x.json", "./x.json", ""] {
            assert_eq!(
                registry.resolve_in("data", bad).err(),
                Some(RegistryError::UnsafePath(bad.to_string())),
                "{bad}"
            );
        }
        assert!(matches!(
            registry.resolve_in("data", "cube.vasp"),
            Err(RegistryError::Unsupported { .. })
        ));
    }
}
