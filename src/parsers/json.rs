use std::fs::File;
use std::io::{BufReader, Read};

use flate2::read::GzDecoder;
use log::debug;

use crate::parsers::Dataset;
use crate::utils::parser::{DatasetParser, ParseError};

fn read_dataset<R: Read>(reader: R) -> Result<Dataset, ParseError> {
    let dataset: Dataset = serde_json::from_reader(reader)?;
    dataset.validate()?;
    debug!(
        "[解析] 读取 {} 条{}记录，盒子边长 {}",
        dataset.len(),
        dataset.kind(),
        dataset.info().box_length
    );
    Ok(dataset)
}

/// JSON 交换格式：`{"kind": "cells", "info": {...}, "cells": [...]}`
pub struct JsonParser;

impl JsonParser {
    pub fn new() -> Self {
        JsonParser
    }
}

impl DatasetParser for JsonParser {
    fn supported_extensions(&self) -> Vec<&'static str> {
        vec!["json"]
    }

    fn name(&self) -> &'static str {
        "JSON Parser"
    }

    fn parse_from_file(&self, file_path: &str) -> Result<Dataset, ParseError> {
        read_dataset(BufReader::new(File::open(file_path)?))
    }
}

/// gzip 压缩的 JSON，内容格式同 [`JsonParser`]
pub struct GzipJsonParser;

impl GzipJsonParser {
    pub fn new() -> Self {
        GzipJsonParser
    }
}

impl DatasetParser for GzipJsonParser {
    fn supported_extensions(&self) -> Vec<&'static str> {
        vec!["json.gz"]
    }

    fn name(&self) -> &'static str {
        "Gzip JSON Parser"
    }

    fn parse_from_file(&self, file_path: &str) -> Result<Dataset, ParseError> {
        let file = File::open(file_path)?;
        read_dataset(GzDecoder::new(BufReader::new(file)))
    }
}
