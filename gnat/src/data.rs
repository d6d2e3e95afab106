//! Dense float descriptors, the concrete point type used by the binaries and the bundled metrics.

use byteorder::{ByteOrder, BigEndian};
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::layout;

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub data: Vec<f32>,
}

impl Descriptor {

    pub fn from_vec(data: Vec<f32>) -> Self {
        return Self { data };
    }

    pub fn len(&self) -> usize {
        return self.data.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.data.is_empty();
    }

    pub fn random(length: usize) -> Self {

        let random_vec: Vec<f32> = (0..length).map(|_| rand::random::<f32>()).collect();
        return Self { data: random_vec };
    }

    /// Parses a line of comma separated values, requiring exactly `dim` of them
    pub fn from_csv_line(line: &str, dim: usize) -> Result<Self> {

        let mut data: Vec<f32> = Vec::with_capacity(dim);

        for field in line.split(',') {
            let field = field.trim();
            let value = field.parse::<f32>()
                .map_err(|e| Error::Parse(format!("{:?}: {}", field, e)))?;
            data.push(value);
        }

        if data.len() != dim {
            return Err(Error::DimensionMismatch { expected: dim, actual: data.len() });
        }

        return Ok(Self { data });
    }

    pub fn yaml(&self) -> String {

        let mut s = "[".to_string();
        for (i, item) in self.data.iter().enumerate() {
            if i != 0 { s += ","; }
            s += &format!("{:.3}", item);
        }
        s += "]";

        return s;
    }

    pub fn to_vec(&self) -> Vec<u8> {

        let mut vec = vec![0u8; layout::descriptor_record_size(self.len())];
        BigEndian::write_f32_into(&self.data, &mut vec);

        return vec;
    }

    pub fn from_slice(slice: &[u8], dim: usize) -> Result<Self> {

        let size = layout::descriptor_record_size(dim);
        if slice.len() != size {
            return Err(Error::DimensionMismatch { expected: size, actual: slice.len() });
        }

        let mut data = vec![0f32; dim];
        BigEndian::read_f32_into(slice, &mut data);

        return Ok(Self { data });
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn parse_csv_line() {

        let descriptor = Descriptor::from_csv_line("1.0, 2.5,-3", 3).unwrap();
        assert_eq!(descriptor.data, vec![1.0, 2.5, -3.0]);

        let wrong_length = Descriptor::from_csv_line("1.0,2.0", 3);
        assert!(matches!(wrong_length, Err(Error::DimensionMismatch { expected: 3, actual: 2 })));

        let garbage = Descriptor::from_csv_line("1.0,abc,2.0", 3);
        assert!(matches!(garbage, Err(Error::Parse(_))));
    }

    #[test]
    fn bytes_and_back() {

        let descriptor = Descriptor::from_vec(vec![0.5, -1.25, 8.0, 1e-3]);
        let bytes = descriptor.to_vec();
        assert_eq!(bytes.len(), 16);

        let back = Descriptor::from_slice(&bytes, 4).unwrap();
        assert_eq!(back, descriptor);

        assert!(Descriptor::from_slice(&bytes[..12], 4).is_err());
    }

    #[test]
    fn yaml_rendering() {
        let descriptor = Descriptor::from_vec(vec![1.0, 0.25]);
        assert_eq!(descriptor.yaml(), "[1.000,0.250]");
    }
}
