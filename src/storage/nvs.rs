//! NVS-backed byte store.
//!
//! The credential region is kept as a single NVS blob so it survives power
//! loss. Reads are served from an in-RAM image loaded at open time.

use super::{check_bounds, ByteStore, StorageError, LAYOUT_LEN};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use log::{debug, info};

/// NVS namespace for the credential region.
const NVS_NAMESPACE: &str = "greenhouse";

/// NVS key for the region image.
const NVS_KEY: &str = "eeprom";

/// Byte store persisted as one NVS blob.
pub struct NvsByteStore {
    nvs: EspNvs<NvsDefault>,
    image: [u8; LAYOUT_LEN],
}

impl NvsByteStore {
    /// Open the store on the default NVS partition.
    ///
    /// Failure here is a boot-time storage failure.
    pub fn open(partition: EspDefaultNvsPartition) -> Result<Self, StorageError> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        let mut image = [0u8; LAYOUT_LEN];
        let mut buf = [0u8; LAYOUT_LEN];

        match nvs.get_raw(NVS_KEY, &mut buf)? {
            Some(bytes) => {
                let len = bytes.len().min(LAYOUT_LEN);
                image[..len].copy_from_slice(&bytes[..len]);
            }
            None => debug!("No credential blob in NVS, starting blank"),
        }

        Ok(Self { nvs, image })
    }
}

impl ByteStore for NvsByteStore {
    fn capacity(&self) -> usize {
        LAYOUT_LEN
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        check_bounds(offset, buf.len(), LAYOUT_LEN)?;
        buf.copy_from_slice(&self.image[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        check_bounds(offset, data.len(), LAYOUT_LEN)?;
        self.image[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.nvs.set_raw(NVS_KEY, &self.image)?;

        // Read back and verify to catch silent flash write failures
        let mut verify = [0u8; LAYOUT_LEN];
        let stored = self
            .nvs
            .get_raw(NVS_KEY, &mut verify)?
            .ok_or(StorageError::VerificationFailed)?;
        if stored != &self.image[..] {
            return Err(StorageError::VerificationFailed);
        }

        info!("Credential region committed to NVS");
        Ok(())
    }
}
