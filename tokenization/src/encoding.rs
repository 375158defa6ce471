//! Encoding results
//!
//! An [`Encoding`] owns one native encoding handle. Its four parallel
//! sequences are built on first read and cached for the encoding's lifetime.

use crate::config::FetchStrategy;
use crate::envelope;
use crate::error::{BindingError, Result};
use crate::handle::{HandleKind, NativeHandle};
use crate::lazy::LazyField;
use crate::library::NativeLibrary;
use crate::owner::ResourceOwner;
use crate::view::LazyIndexedView;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::ffi::{c_char, CStr};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokenbridge_abi::{decode_sequence_id, layout_of, EncodingListFn, RawHandle, RawList};

pub struct Encoding {
    len: usize,
    tokens: LazyField<LazyIndexedView<String>>,
    ids: LazyField<LazyIndexedView<u32>>,
    sequence_ids: LazyField<LazyIndexedView<Option<usize>>>,
    attention_mask: LazyField<LazyIndexedView<u32>>,
    owner: ResourceOwner,
}

/// Owned copy of an encoding's sequences, detached from native memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodingSnapshot {
    pub tokens: Vec<String>,
    pub ids: Vec<u32>,
    pub sequence_ids: Vec<Option<usize>>,
    pub attention_mask: Vec<u32>,
}

impl EncodingSnapshot {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Encoding {
    pub(crate) fn from_handle(library: Arc<NativeLibrary>, handle: NativeHandle) -> Result<Self> {
        Self::from_owner(ResourceOwner::for_kind(library, handle, HandleKind::Encoding))
    }

    /// Takes ownership first so the handle is released even if the length query fails.
    pub(crate) fn from_owner(owner: ResourceOwner) -> Result<Self> {
        let library = owner.library();
        let raw = unsafe { (library.functions().encoding_get_len)(owner.handle().as_raw()) };
        let len = envelope::decode(library, raw)?;
        Ok(Self {
            len,
            tokens: LazyField::new(),
            ids: LazyField::new(),
            sequence_ids: LazyField::new(),
            attention_mask: LazyField::new(),
            owner,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn tokens(&self) -> Result<&LazyIndexedView<String>> {
        self.tokens.get_or_try_init(|| self.load::<Tokens>())
    }

    pub fn ids(&self) -> Result<&LazyIndexedView<u32>> {
        self.ids.get_or_try_init(|| self.load::<Ids>())
    }

    /// Sequence index per token, `None` for tokens added by the post-processor
    pub fn sequence_ids(&self) -> Result<&LazyIndexedView<Option<usize>>> {
        self.sequence_ids.get_or_try_init(|| self.load::<SequenceIds>())
    }

    pub fn attention_mask(&self) -> Result<&LazyIndexedView<u32>> {
        self.attention_mask.get_or_try_init(|| self.load::<AttentionMask>())
    }

    fn load<F: NativeField>(&self) -> Result<LazyIndexedView<F::Item>> {
        let strategy = self.owner.library().config().fetch;
        log::debug!("Materializing {} ({:?}) for {:?}", F::NAME, strategy, self.owner.handle());
        load_view::<F>(&self.owner, self.len, strategy)
    }

    /// Native structural equality of the two encodings.
    pub fn try_eq(&self, other: &Encoding) -> Result<bool> {
        let library = self.owner.library();
        let raw = unsafe {
            (library.functions().encoding_eq)(
                self.owner.handle().as_raw(),
                other.owner.handle().as_raw(),
            )
        };
        envelope::decode(library, raw)
    }

    /// Hash over length, tokens and ids.
    pub fn content_hash(&self) -> Result<u64> {
        let mut result = self.len as u64;
        result = result.wrapping_mul(31).wrapping_add(hash_view(self.tokens()?)?);
        result = result.wrapping_mul(31).wrapping_add(hash_view(self.ids()?)?);
        Ok(result)
    }

    pub fn snapshot(&self) -> Result<EncodingSnapshot> {
        Ok(EncodingSnapshot {
            tokens: self.tokens()?.to_vec()?,
            ids: self.ids()?.to_vec()?,
            sequence_ids: self.sequence_ids()?.to_vec()?,
            attention_mask: self.attention_mask()?.to_vec()?,
        })
    }

    /// Release the native encoding now
    pub fn close(self) {
        let Encoding { owner, .. } = self;
        owner.release();
    }
}

fn hash_view<T: Hash>(view: &LazyIndexedView<T>) -> Result<u64> {
    let mut hasher = DefaultHasher::new();
    view.len().hash(&mut hasher);
    for value in view.iter() {
        value?.hash(&mut hasher);
    }
    Ok(hasher.finish())
}

impl PartialEq for Encoding {
    fn eq(&self, other: &Self) -> bool {
        match self.try_eq(other) {
            Ok(equal) => equal,
            Err(e) => {
                log::warn!("Native encoding comparison failed, treating as unequal: {}", e);
                false
            }
        }
    }
}

impl Eq for Encoding {}

/// Hashes the length only. Natively equal encodings always share a length,
/// and no native read can fail here. Use [`Encoding::content_hash`] for a
/// hash over tokens and ids.
impl Hash for Encoding {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len.hash(state);
    }
}

impl fmt::Debug for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoding")
            .field("len", &self.len)
            .field("handle", &self.owner.handle())
            .finish_non_exhaustive()
    }
}

/// One of an encoding's derived sequences and the native calls behind it.
trait NativeField: 'static {
    type Item: Send + Sync + 'static;

    const NAME: &'static str;
    const BULK_OPERATION: &'static str;

    fn bulk(library: &NativeLibrary) -> EncodingListFn;

    /// # Safety
    /// `list` must be a non-null list of this field's element type with `index < list.len`.
    unsafe fn extract(list: &RawList, index: usize) -> Result<Self::Item>;

    fn release(library: &NativeLibrary, list: RawList);

    fn fetch_at(library: &NativeLibrary, handle: NativeHandle, index: usize) -> Result<Self::Item>;
}

fn release_plain<T>(library: &NativeLibrary, list: RawList) {
    let (size, align) = layout_of::<T>();
    unsafe { (library.functions().release_list)(list, size, align) };
}

fn load_view<F: NativeField>(
    owner: &ResourceOwner,
    len: usize,
    strategy: FetchStrategy,
) -> Result<LazyIndexedView<F::Item>> {
    let library = owner.library().clone();
    let handle = owner.handle();
    match strategy {
        FetchStrategy::PerIndex => Ok(LazyIndexedView::per_index(len, move |index| {
            F::fetch_at(&library, handle, index)
        })),
        FetchStrategy::Bulk => LazyIndexedView::from_bulk(
            len,
            || {
                let raw = unsafe { (F::bulk(&library))(handle.as_raw()) };
                envelope::decode_list(&library, raw, F::BULK_OPERATION)
            },
            // SAFETY: from_bulk only extracts indices below the list length,
            // and decode_list rejects a null pointer with a non-zero length.
            |list, index| unsafe { F::extract(list, index) },
            |list| F::release(&library, list),
        ),
    }
}

struct Tokens;
struct Ids;
struct SequenceIds;
struct AttentionMask;

impl NativeField for Tokens {
    type Item = String;

    const NAME: &'static str = "tokens";
    const BULK_OPERATION: &'static str = "encoding_get_tokens";

    fn bulk(library: &NativeLibrary) -> EncodingListFn {
        library.functions().encoding_get_tokens
    }

    unsafe fn extract(list: &RawList, index: usize) -> Result<String> {
        let ptr = list.read::<*mut c_char>(index);
        if ptr.is_null() {
            log::error!("Native contract violation: null token at index {}", index);
            return Err(BindingError::NullElement { index });
        }
        Ok(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }

    /// Every token string goes back before the list that holds them.
    fn release(library: &NativeLibrary, list: RawList) {
        if !list.is_null() {
            for index in 0..list.len {
                let ptr = unsafe { list.read::<*mut c_char>(index) };
                if !ptr.is_null() {
                    unsafe { (library.functions().release_string)(ptr) };
                }
            }
        }
        release_plain::<*mut c_char>(library, list);
    }

    fn fetch_at(library: &NativeLibrary, handle: NativeHandle, index: usize) -> Result<String> {
        let raw = unsafe { (library.functions().encoding_get_token_at)(handle.as_raw(), index) };
        envelope::decode_string(library, raw, "encoding_get_token_at")
    }
}

impl NativeField for Ids {
    type Item = u32;

    const NAME: &'static str = "ids";
    const BULK_OPERATION: &'static str = "encoding_get_ids";

    fn bulk(library: &NativeLibrary) -> EncodingListFn {
        library.functions().encoding_get_ids
    }

    unsafe fn extract(list: &RawList, index: usize) -> Result<u32> {
        Ok(list.read::<u32>(index))
    }

    fn release(library: &NativeLibrary, list: RawList) {
        release_plain::<u32>(library, list);
    }

    fn fetch_at(library: &NativeLibrary, handle: NativeHandle, index: usize) -> Result<u32> {
        let raw = unsafe { (library.functions().encoding_get_id_at)(handle.as_raw(), index) };
        envelope::decode(library, raw)
    }
}

impl NativeField for SequenceIds {
    type Item = Option<usize>;

    const NAME: &'static str = "sequence_ids";
    const BULK_OPERATION: &'static str = "encoding_get_sequence_ids";

    fn bulk(library: &NativeLibrary) -> EncodingListFn {
        library.functions().encoding_get_sequence_ids
    }

    unsafe fn extract(list: &RawList, index: usize) -> Result<Option<usize>> {
        Ok(decode_sequence_id(list.read::<usize>(index)))
    }

    fn release(library: &NativeLibrary, list: RawList) {
        release_plain::<usize>(library, list);
    }

    fn fetch_at(
        library: &NativeLibrary,
        handle: NativeHandle,
        index: usize,
    ) -> Result<Option<usize>> {
        let raw =
            unsafe { (library.functions().encoding_get_sequence_id_at)(handle.as_raw(), index) };
        envelope::decode(library, raw).map(decode_sequence_id)
    }
}

impl NativeField for AttentionMask {
    type Item = u32;

    const NAME: &'static str = "attention_mask";
    const BULK_OPERATION: &'static str = "encoding_get_attention_mask";

    fn bulk(library: &NativeLibrary) -> EncodingListFn {
        library.functions().encoding_get_attention_mask
    }

    unsafe fn extract(list: &RawList, index: usize) -> Result<u32> {
        Ok(list.read::<u32>(index))
    }

    fn release(library: &NativeLibrary, list: RawList) {
        release_plain::<u32>(library, list);
    }

    fn fetch_at(library: &NativeLibrary, handle: NativeHandle, index: usize) -> Result<u32> {
        let raw =
            unsafe { (library.functions().encoding_get_attention_mask_at)(handle.as_raw(), index) };
        envelope::decode(library, raw)
    }
}

/// Raw handle list from `tokenizer_encode_batch`, read then handed back.
pub(crate) fn take_handle_list(
    library: &NativeLibrary,
    list: RawList,
) -> Vec<Option<NativeHandle>> {
    let handles = (0..list.len)
        .map(|index| {
            if list.is_null() {
                None
            } else {
                NativeHandle::new(unsafe { list.read::<RawHandle>(index) })
            }
        })
        .collect();
    release_plain::<RawHandle>(library, list);
    handles
}
