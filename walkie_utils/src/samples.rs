//! Conversions between the DMA engine's 32-bit sample words and 16-bit PCM.
//!
//! The audio path carries 16 bits of precision in the upper half of each DMA
//! word, the lower half is discarded when narrowing and zero when widening.

/// Number of bits separating a DMA word from its 16-bit PCM value.
pub const WORD_SHIFT: u32 = 16;

#[inline(always)]
pub const fn narrow(word: i32) -> i16 {
    (word >> WORD_SHIFT) as i16
}

#[inline(always)]
pub const fn widen(sample: i16) -> i32 {
    (sample as i32) << WORD_SHIFT
}

/// Narrows as many words as fit in `dst`, returning how many were converted.
#[inline]
pub fn narrow_into(src: &[i32], dst: &mut [i16]) -> usize {
    let n = src.len().min(dst.len());

    dst.iter_mut()
        .zip(src)
        .for_each(|(sample, &word)| *sample = narrow(word));

    n
}

/// Widens as many samples as fit in `dst`, returning how many were converted.
#[inline]
pub fn widen_into(src: &[i16], dst: &mut [i32]) -> usize {
    let n = src.len().min(dst.len());

    dst.iter_mut()
        .zip(src)
        .for_each(|(word, &sample)| *word = widen(sample));

    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn keeps_upper_half() {
        assert_eq!(narrow(0x1234_0000), 0x1234);
        assert_eq!(narrow(0x1234_FFFF), 0x1234);
        assert_eq!(widen(0x1234), 0x1234_0000);
        assert_eq!(narrow(i32::MIN), i16::MIN);
        assert_eq!(widen(-1), -65536);
    }

    #[test]
    fn slices_convert_up_to_the_shorter_length() {
        let words = [0x0001_0000, 0x7FFF_0000, -0x0001_0000];
        let mut pcm = [0i16; 2];

        assert_eq!(narrow_into(&words, &mut pcm), 2);
        assert_eq!(pcm, [1, 0x7FFF]);

        let mut back = [0i32; 4];
        assert_eq!(widen_into(&pcm, &mut back), 2);
        assert_eq!(back, [0x0001_0000, 0x7FFF_0000, 0, 0]);
    }

    proptest! {
        #[test]
        fn narrowing_undoes_widening(sample in any::<i16>()) {
            prop_assert_eq!(narrow(widen(sample)), sample);
        }

        #[test]
        fn widening_clears_the_low_half(word in any::<i32>()) {
            prop_assert_eq!(widen(narrow(word)), word & !0xFFFF);
        }
    }
}
