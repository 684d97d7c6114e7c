use super::JobQueue;
use crate::backend::{Completion, CopyParams};
use crate::{Copier, Error, Result};
use pano_core::CopyArea;

/// Copies a non-overlapping slice region straight into the output frame.
pub struct CpuCopier {
    index: usize,
    area: CopyArea,
    queue: JobQueue,
}

impl CpuCopier {
    pub(crate) fn new(index: usize, area: CopyArea, queue: JobQueue) -> Result<Self> {
        if area.in_area.is_empty() || !area.in_area.same_size(&area.out_area) {
            return Err(Error::InvalidInput(format!(
                "copy area {} has mismatched regions {:?} -> {:?}",
                index, area.in_area, area.out_area
            )));
        }
        Ok(Self { index, area, queue })
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl Copier for CpuCopier {
    fn area(&self) -> &CopyArea {
        &self.area
    }

    fn dispatch(&self, params: CopyParams, done: Completion<CopyParams>) -> Result<()> {
        let area = self.area;
        self.queue.submit(params, done, move |p| {
            let source = p.source.read();
            let mut output = p.output.write();
            output.copy_rect_from(&source, &area.in_area, &area.out_area)?;
            Ok(())
        })
    }

    fn terminate(&self) {
        self.queue.terminate();
    }
}
