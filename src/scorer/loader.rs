use crate::consts::MODEL_PARAM_VERSION;
use crate::error::{DecodeError, DecodeResult};
use crate::s3file::{checked_product, S3Reader, S3Writer};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::debug;

/// Raw Gaussian parameter array (means or variances) as stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct GaudenParam {
    pub n_mgau: usize,
    pub n_density: usize,
    pub feat_lens: Vec<usize>,
    // [mgau][feat][density][dim]
    pub data: Vec<f32>,
}

impl GaudenParam {
    /// Regroups the file order into one `[mgau][density][dim]` buffer per
    /// stream.
    pub fn into_streams(self) -> Vec<Vec<f32>> {
        let blk: usize = self.feat_lens.iter().sum();
        let mut streams: Vec<Vec<f32>> = self
            .feat_lens
            .iter()
            .map(|&l| Vec::with_capacity(self.n_mgau * self.n_density * l))
            .collect();
        for m in 0..self.n_mgau {
            let mut offset = m * self.n_density * blk;
            for (f, &len) in self.feat_lens.iter().enumerate() {
                let span = self.n_density * len;
                streams[f].extend_from_slice(&self.data[offset..offset + span]);
                offset += span;
            }
        }
        streams
    }
}

/// Raw mixture weights as stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct MixwParam {
    pub n_sen: usize,
    pub n_feat: usize,
    pub n_density: usize,
    // [sen][feat][density]
    pub data: Vec<f32>,
}

fn positive(v: i32, what: &str) -> DecodeResult<usize> {
    if v <= 0 {
        return Err(DecodeError::Format(format!("{} must be positive, got {}", what, v)));
    }
    Ok(v as usize)
}

pub fn read_gauden_param<R: Read>(reader: R) -> DecodeResult<GaudenParam> {
    let mut rdr = S3Reader::new(reader)?;
    rdr.check_version(MODEL_PARAM_VERSION);

    let n_mgau = positive(rdr.read_i32("codebook count")?, "codebook count")?;
    let n_feat = positive(rdr.read_i32("stream count")?, "stream count")?;
    let n_density = positive(rdr.read_i32("density count")?, "density count")?;
    let feat_lens = rdr
        .read_i32s(n_feat, "stream lengths")?
        .into_iter()
        .map(|l| positive(l, "stream length"))
        .collect::<DecodeResult<Vec<usize>>>()?;
    let n = rdr.read_i32("value count")?;

    let blk: usize = feat_lens.iter().sum();
    let expected = checked_product(&[n_mgau, n_density, blk])?;
    if n < 0 || n as usize != expected {
        return Err(DecodeError::Dimension(format!(
            "value count {} != {} x {} x {}",
            n, n_mgau, n_density, blk
        )));
    }
    let data = rdr.read_f32s(expected, "Gaussian parameters")?;
    rdr.verify_checksum()?;
    rdr.expect_eof()?;

    debug!(
        "{} codebooks, {} streams {:?}, {} densities",
        n_mgau, n_feat, feat_lens, n_density
    );
    Ok(GaudenParam {
        n_mgau,
        n_density,
        feat_lens,
        data,
    })
}

pub fn load_gauden_param<P: AsRef<Path>>(path: P) -> DecodeResult<GaudenParam> {
    let file = File::open(path)?;
    read_gauden_param(BufReader::new(file))
}

pub fn write_gauden_param<W: Write>(
    writer: W,
    param: &GaudenParam,
    with_checksum: bool,
) -> DecodeResult<W> {
    let mut w = S3Writer::new(
        writer,
        &[("version", MODEL_PARAM_VERSION)],
        with_checksum,
        false,
    )?;
    w.write_i32s(&[
        param.n_mgau as i32,
        param.feat_lens.len() as i32,
        param.n_density as i32,
    ])?;
    let lens: Vec<i32> = param.feat_lens.iter().map(|&l| l as i32).collect();
    w.write_i32s(&lens)?;
    w.write_i32(param.data.len() as i32)?;
    w.write_f32s(&param.data)?;
    w.finish()
}

pub fn read_mixw_param<R: Read>(reader: R) -> DecodeResult<MixwParam> {
    let mut rdr = S3Reader::new(reader)?;
    rdr.check_version(MODEL_PARAM_VERSION);

    let n_sen = positive(rdr.read_i32("senone count")?, "senone count")?;
    let n_feat = positive(rdr.read_i32("stream count")?, "stream count")?;
    let n_density = positive(rdr.read_i32("density count")?, "density count")?;
    let n = rdr.read_i32("value count")?;

    let expected = checked_product(&[n_sen, n_feat, n_density])?;
    if n < 0 || n as usize != expected {
        return Err(DecodeError::Dimension(format!(
            "mixture weight count {} != {} x {} x {}",
            n, n_sen, n_feat, n_density
        )));
    }
    let data = rdr.read_f32s(expected, "mixture weights")?;
    rdr.verify_checksum()?;
    rdr.expect_eof()?;

    Ok(MixwParam {
        n_sen,
        n_feat,
        n_density,
        data,
    })
}

pub fn load_mixw_param<P: AsRef<Path>>(path: P) -> DecodeResult<MixwParam> {
    let file = File::open(path)?;
    read_mixw_param(BufReader::new(file))
}

pub fn write_mixw_param<W: Write>(
    writer: W,
    param: &MixwParam,
    with_checksum: bool,
) -> DecodeResult<W> {
    let mut w = S3Writer::new(
        writer,
        &[("version", MODEL_PARAM_VERSION)],
        with_checksum,
        false,
    )?;
    w.write_i32s(&[
        param.n_sen as i32,
        param.n_feat as i32,
        param.n_density as i32,
        param.data.len() as i32,
    ])?;
    w.write_f32s(&param.data)?;
    w.finish()
}
